use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    Point,
    error::{FetchError, RecordError},
    model::epoch_nanos,
};

use super::{ApiFormat, ObservationSource, get_body};

/// weather.com PWS history API (`v2/pws/history`), JSON in metric units.
#[derive(Debug, Clone)]
pub struct PwsHistorySource {
    station_id: String,
    api_key: String,
    http: Client,
    base_url: String,
}

impl PwsHistorySource {
    pub fn new(station_id: String, api_key: String, http: Client) -> Self {
        Self { station_id, api_key, http, base_url: ApiFormat::Json.endpoint().to_string() }
    }

    /// Point at another host serving the `v2/pws/history` format.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn query(&self, date: NaiveDate) -> Vec<(&'static str, String)> {
        vec![
            ("stationId", self.station_id.clone()),
            ("apiKey", self.api_key.clone()),
            ("format", "json".to_string()),
            ("units", "m".to_string()),
            ("numericPrecision", "decimal".to_string()),
            ("date", date.format("%Y%m%d").to_string()),
        ]
    }
}

#[async_trait]
impl ObservationSource for PwsHistorySource {
    async fn fetch_day(&self, date: NaiveDate) -> Result<Vec<Point>, FetchError> {
        let body = get_body(&self.http, date, &self.base_url, &self.query(date)).await?;
        parse_history(&self.station_id, date, &body)
    }
}

/// Decode one day's response and map every observation.
///
/// Observations are numbered from 1 in errors, like CSV data rows.
pub fn parse_history(station_id: &str, date: NaiveDate, body: &str) -> Result<Vec<Point>, FetchError> {
    let parsed: ApiResponse =
        serde_json::from_str(body).map_err(|source| FetchError::Decode { date, source })?;

    parsed
        .observations
        .iter()
        .enumerate()
        .map(|(i, obs)| {
            if epoch_nanos(&obs.obs_time_utc).is_none() {
                let source = RecordError::OutOfRange { value: obs.obs_time_utc.to_rfc3339() };
                return Err(FetchError::Record { date, record: i + 1, source });
            }
            Ok(obs.to_point(station_id))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub observations: Vec<Observation>,
}

/// One aggregated reading. The API sends `null` for readings a station lacks.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(rename = "stationID", default)]
    pub station_id: String,
    #[serde(rename = "tz")]
    pub timezone: Option<String>,
    pub obs_time_utc: DateTime<Utc>,
    pub obs_time_local: Option<String>,
    pub epoch: Option<i64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub solar_radiation_high: Option<f64>,
    pub uv_high: Option<f64>,
    pub winddir_avg: Option<f64>,
    pub humidity_high: Option<f64>,
    pub humidity_low: Option<f64>,
    pub humidity_avg: Option<f64>,
    pub qc_status: Option<i64>,
    #[serde(default)]
    pub metric: MetricObservation,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MetricObservation {
    pub temp_high: Option<f64>,
    pub temp_low: Option<f64>,
    pub temp_avg: Option<f64>,

    pub windspeed_high: Option<f64>,
    pub windspeed_low: Option<f64>,
    pub windspeed_avg: Option<f64>,

    pub windgust_high: Option<f64>,
    pub windgust_low: Option<f64>,
    pub windgust_avg: Option<f64>,

    pub dewpt_high: Option<f64>,
    pub dewpt_low: Option<f64>,
    pub dewpt_avg: Option<f64>,

    pub windchill_high: Option<f64>,
    pub windchill_low: Option<f64>,
    pub windchill_avg: Option<f64>,

    pub heatindex_high: Option<f64>,
    pub heatindex_low: Option<f64>,
    pub heatindex_avg: Option<f64>,

    pub pressure_max: Option<f64>,
    pub pressure_min: Option<f64>,
    pub pressure_trend: Option<f64>,

    pub precip_rate: Option<f64>,
    pub precip_total: Option<f64>,
}

impl Observation {
    pub fn to_point(&self, fallback_station: &str) -> Point {
        let station = if self.station_id.is_empty() { fallback_station } else { self.station_id.as_str() };
        let m = &self.metric;
        let mut point = Point::new(station, self.obs_time_utc);

        // Same field names as the CSV import so existing dashboards keep working.
        point.field_opt("temperature", m.temp_avg);
        point.field_opt("dewpoint", m.dewpt_avg);
        point.field_opt("pressure", m.pressure_max.zip(m.pressure_min).map(|(max, min)| (max + min) / 2.0));
        point.field_opt("wind_direction", self.winddir_avg);
        point.field_opt("wind_speed", m.windspeed_avg);
        point.field_opt("wind_speed_gust", m.windgust_avg);
        point.field_opt("humidity", self.humidity_avg.map(humidity));
        point.field_opt("solar_radiation", self.solar_radiation_high);

        point.field_opt("temperature_high", m.temp_high);
        point.field_opt("temperature_low", m.temp_low);
        point.field_opt("temperature_average", m.temp_avg);
        point.field_opt("wind_speed_high", m.windspeed_high);
        point.field_opt("wind_speed_low", m.windspeed_low);
        point.field_opt("wind_speed_average", m.windspeed_avg);
        point.field_opt("wind_gust_high", m.windgust_high);
        point.field_opt("wind_gust_low", m.windgust_low);
        point.field_opt("wind_gust_average", m.windgust_avg);
        point.field_opt("dewpoint_high", m.dewpt_high);
        point.field_opt("dewpoint_low", m.dewpt_low);
        point.field_opt("dewpoint_average", m.dewpt_avg);
        point.field_opt("wind_chill_high", m.windchill_high);
        point.field_opt("wind_chill_low", m.windchill_low);
        point.field_opt("wind_chill_average", m.windchill_avg);
        point.field_opt("heat_index_high", m.heatindex_high);
        point.field_opt("heat_index_low", m.heatindex_low);
        point.field_opt("heat_index_average", m.heatindex_avg);
        point.field_opt("pressure_max", m.pressure_max);
        point.field_opt("pressure_min", m.pressure_min);
        point.field_opt("pressure_trend", m.pressure_trend);
        point.field_opt("precipitation_rate", m.precip_rate);
        point.field_opt("precipitation_total", m.precip_total);

        point.field_opt("uv_high", self.uv_high);
        point.field_opt("humidity_high", self.humidity_high.map(humidity));
        point.field_opt("humidity_low", self.humidity_low.map(humidity));
        point.field_opt("humidity_average", self.humidity_avg.map(humidity));
        point.field_opt("solar_radiation_high", self.solar_radiation_high);
        point.field_opt("wind_direction_average", self.winddir_avg);

        point
    }
}

/// Relative humidity is stored as a whole percentage, like the CSV import.
fn humidity(value: f64) -> i64 {
    value.round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldValue;
    use chrono::TimeZone;
    use reqwest::StatusCode;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    const BODY: &str = r#"{
      "observations": [
        {
          "stationID": "KXXTEST1",
          "tz": "America/Chicago",
          "obsTimeUtc": "2024-03-01T06:59:56Z",
          "obsTimeLocal": "2024-03-01 00:59:56",
          "epoch": 1709276396,
          "lat": 41.88,
          "lon": -87.63,
          "solarRadiationHigh": 0.0,
          "uvHigh": 0.0,
          "winddirAvg": 212.0,
          "humidityHigh": 58.0,
          "humidityLow": 52.0,
          "humidityAvg": 55.0,
          "qcStatus": 1,
          "metric": {
            "tempHigh": 22.1, "tempLow": 20.9, "tempAvg": 21.5,
            "windspeedHigh": 9.7, "windspeedLow": 0.0, "windspeedAvg": 3.4,
            "windgustHigh": 14.5, "windgustLow": 0.0, "windgustAvg": 5.1,
            "dewptHigh": 12.8, "dewptLow": 11.9, "dewptAvg": 12.3,
            "windchillHigh": 22.1, "windchillLow": 20.9, "windchillAvg": 21.5,
            "heatindexHigh": 22.1, "heatindexLow": 20.9, "heatindexAvg": 21.5,
            "pressureMax": 1016.6, "pressureMin": 1015.2, "pressureTrend": -0.34,
            "precipRate": 0.0, "precipTotal": 0.0
          }
        }
      ]
    }"#;

    #[test]
    fn maps_legacy_fields_and_tags() {
        let points = parse_history("KXXTEST1", date(), BODY).unwrap();
        assert_eq!(points.len(), 1);

        let p = &points[0];
        assert_eq!(p.timestamp, Utc.with_ymd_and_hms(2024, 3, 1, 6, 59, 56).unwrap());
        assert_eq!(p.tags["station"], "KXXTEST1");
        assert_eq!(p.tags["provider"], "wunderground");
        assert_eq!(p.fields["temperature"], FieldValue::Float(21.5));
        assert_eq!(p.fields["humidity"], FieldValue::Integer(55));
        assert_eq!(p.fields["dewpoint"], FieldValue::Float(12.3));
        assert_eq!(p.fields["wind_direction"], FieldValue::Float(212.0));
        assert_eq!(p.fields["wind_speed_gust"], FieldValue::Float(5.1));
    }

    #[test]
    fn pressure_is_mean_of_max_and_min() {
        let p = &parse_history("KXXTEST1", date(), BODY).unwrap()[0];

        let FieldValue::Float(pressure) = p.fields["pressure"] else {
            panic!("pressure should be a float");
        };
        assert!((pressure - (1016.6 + 1015.2) / 2.0).abs() < 1e-9);
        assert_eq!(p.fields["pressure_max"], FieldValue::Float(1016.6));
        assert_eq!(p.fields["pressure_min"], FieldValue::Float(1015.2));
    }

    #[test]
    fn keeps_high_low_average_readings() {
        let p = &parse_history("KXXTEST1", date(), BODY).unwrap()[0];

        assert_eq!(p.fields["temperature_high"], FieldValue::Float(22.1));
        assert_eq!(p.fields["wind_chill_low"], FieldValue::Float(20.9));
        assert_eq!(p.fields["heat_index_average"], FieldValue::Float(21.5));
        assert_eq!(p.fields["pressure_trend"], FieldValue::Float(-0.34));
        assert_eq!(p.fields["humidity_high"], FieldValue::Integer(58));
        assert_eq!(p.fields["humidity_low"], FieldValue::Integer(52));
        assert_eq!(p.fields["uv_high"], FieldValue::Float(0.0));
        assert_eq!(p.fields["wind_direction_average"], FieldValue::Float(212.0));
    }

    #[test]
    fn fractional_humidity_rounds_to_whole_number() {
        let body = BODY.replace("\"humidityAvg\": 55.0", "\"humidityAvg\": 54.6");
        let p = &parse_history("KXXTEST1", date(), &body).unwrap()[0];
        assert_eq!(p.fields["humidity"], FieldValue::Integer(55));
    }

    #[test]
    fn null_readings_are_left_out() {
        let body = BODY
            .replace("\"pressureMin\": 1015.2", "\"pressureMin\": null")
            .replace("\"uvHigh\": 0.0", "\"uvHigh\": null");
        let p = &parse_history("KXXTEST1", date(), &body).unwrap()[0];

        assert!(!p.fields.contains_key("pressure"));
        assert!(!p.fields.contains_key("pressure_min"));
        assert!(!p.fields.contains_key("uv_high"));
        assert_eq!(p.fields["pressure_max"], FieldValue::Float(1016.6));
    }

    #[test]
    fn empty_station_id_falls_back_to_configured() {
        let body = BODY.replace("\"stationID\": \"KXXTEST1\"", "\"stationID\": \"\"");
        let p = &parse_history("KCONFIG1", date(), &body).unwrap()[0];
        assert_eq!(p.tags["station"], "KCONFIG1");
    }

    #[test]
    fn empty_observation_list_yields_no_points() {
        let points = parse_history("KXXTEST1", date(), r#"{"observations": []}"#).unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn invalid_json_is_a_decode_error() {
        let err = parse_history("KXXTEST1", date(), "<html>oops</html>").unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
        assert!(err.to_string().contains("2024-03-01"));
    }

    #[test]
    fn pre_epoch_observation_fails_the_day() {
        let body = BODY.replace("2024-03-01T06:59:56Z", "1969-12-31T23:00:00Z");

        let err = parse_history("KXXTEST1", date(), &body).unwrap_err();
        match err {
            FetchError::Record { date: day, record, source: RecordError::OutOfRange { .. } } => {
                assert_eq!(day, date());
                assert_eq!(record, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    async fn serve(status: u16, text: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/pws/history/hourly"))
            .and(query_param("stationId", "KXXTEST1"))
            .and(query_param("apiKey", "SECRET"))
            .and(query_param("units", "m"))
            .and(query_param("date", "20240301"))
            .respond_with(ResponseTemplate::new(status).set_body_string(text))
            .mount(&server)
            .await;
        server
    }

    fn source(server: &MockServer) -> PwsHistorySource {
        PwsHistorySource::new("KXXTEST1".into(), "SECRET".into(), Client::new())
            .with_base_url(format!("{}/v2/pws/history/hourly", server.uri()))
    }

    #[tokio::test]
    async fn fetch_day_parses_ok_response() {
        let server = serve(200, BODY).await;

        let points = source(&server).fetch_day(date()).await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].fields["temperature"], FieldValue::Float(21.5));
    }

    #[tokio::test]
    async fn fetch_day_fails_on_no_content_and_server_error() {
        for code in [204, 503] {
            let server = serve(code, "").await;

            let err = source(&server).fetch_day(date()).await.unwrap_err();
            match err {
                FetchError::Status { date: day, url, status, .. } => {
                    assert_eq!(day, date());
                    assert_eq!(status, StatusCode::from_u16(code).unwrap());
                    assert!(url.contains("apiKey=REDACTED"), "url {url}");
                    assert!(!url.contains("SECRET"));
                }
                other => panic!("unexpected error for {code}: {other:?}"),
            }
        }
    }

    #[test]
    fn query_uses_compact_date_and_metric_units() {
        let source = PwsHistorySource::new("KXXTEST1".into(), "KEY".into(), Client::new());
        let query = source.query(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());

        assert!(query.contains(&("stationId", "KXXTEST1".to_string())));
        assert!(query.contains(&("apiKey", "KEY".to_string())));
        assert!(query.contains(&("format", "json".to_string())));
        assert!(query.contains(&("units", "m".to_string())));
        assert!(query.contains(&("date", "20240309".to_string())));
    }
}
