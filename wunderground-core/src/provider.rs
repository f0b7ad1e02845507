use crate::{
    FetchError, ImportConfig, Point,
    provider::{legacy_csv::LegacyCsvSource, pws_json::PwsHistorySource},
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode, Url};
use std::{fmt::Debug, str::FromStr};

pub mod legacy_csv;
pub mod pws_json;

/// Weather Underground moved station history from a CSV page on
/// wunderground.com to the weather.com PWS API. Both are still reachable,
/// so the stored config and `--format` pick one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ApiFormat {
    /// `WXDailyHistory.asp`: one comma separated document per day, no key.
    Csv,
    /// `v2/pws/history/hourly`: JSON observations, needs an API key.
    #[default]
    Json,
}

impl ApiFormat {
    /// Name used on the command line and in the config file.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiFormat::Csv => "csv",
            ApiFormat::Json => "json",
        }
    }

    /// Daily history endpoint queried for this format.
    pub fn endpoint(&self) -> &'static str {
        match self {
            ApiFormat::Csv => "https://www.wunderground.com/weatherstation/WXDailyHistory.asp",
            ApiFormat::Json => "https://api.weather.com/v2/pws/history/hourly",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, ApiFormat::Json)
    }

    /// In the order offered by `configure`.
    pub const fn all() -> &'static [ApiFormat] {
        &[ApiFormat::Csv, ApiFormat::Json]
    }
}

impl std::fmt::Display for ApiFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ApiFormat::Csv => "csv (wunderground.com WXDailyHistory)",
            ApiFormat::Json => "json (weather.com PWS history)",
        };
        f.write_str(label)
    }
}

impl FromStr for ApiFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "csv" | "legacy" => Ok(ApiFormat::Csv),
            "json" | "pws" => Ok(ApiFormat::Json),
            _ => Err(anyhow::anyhow!(
                "Unknown history API format '{value}'. Use `csv` for the WXDailyHistory.asp \
                 export or `json` for the weather.com PWS history API."
            )),
        }
    }
}

/// Fetches one day of observations for a station and maps them to points.
#[async_trait]
pub trait ObservationSource: Send + Sync + Debug {
    async fn fetch_day(&self, date: NaiveDate) -> Result<Vec<Point>, FetchError>;
}

/// Construct the source selected by `config.format`.
pub fn source_from_config(config: &ImportConfig) -> anyhow::Result<Box<dyn ObservationSource>> {
    let http = Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let boxed: Box<dyn ObservationSource> = match config.format {
        ApiFormat::Csv => Box::new(LegacyCsvSource::new(config.station_id.clone(), http)),
        ApiFormat::Json => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                anyhow::anyhow!(
                    "No API key configured; the weather.com PWS history API requires one.\n\
                     Hint: pass --api-key, set WUNDERGROUND_API_KEY or run \
                     `wunderground-import configure`."
                )
            })?;
            Box::new(PwsHistorySource::new(config.station_id.clone(), api_key, http))
        }
    };

    Ok(boxed)
}

/// GET `url` with `query` and return the body. Anything but 200 OK is an error.
async fn get_body(
    http: &Client,
    date: NaiveDate,
    url: &str,
    query: &[(&str, String)],
) -> Result<String, FetchError> {
    let request = http
        .get(url)
        .query(query)
        .build()
        .map_err(|source| FetchError::Request { date, url: url.to_string(), source })?;
    let full_url = redact_api_key(request.url());
    log::debug!("GET {full_url}");

    let res = http
        .execute(request)
        .await
        .map_err(|source| FetchError::Request { date, url: full_url.clone(), source })?;

    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|source| FetchError::Request { date, url: full_url.clone(), source })?;

    if status != StatusCode::OK {
        return Err(FetchError::Status { date, url: full_url, status, body: truncate_body(&body) });
    }

    Ok(body)
}

fn redact_api_key(url: &Url) -> String {
    let mut url = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "apiKey" { "REDACTED".into() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.to_string()
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
