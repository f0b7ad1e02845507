use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord};
use reqwest::Client;

use crate::{
    Point,
    error::{FetchError, RecordError},
    model::epoch_nanos,
};

use super::{ApiFormat, ObservationSource, get_body};

/// Timestamp layout of the `DateUTC` column.
const DATA_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Exact header line the endpoint must return, in column order.
pub const RECORD_NAMES: [&str; 16] = [
    "Time",
    "TemperatureC",
    "DewpointC",
    "PressurehPa",
    "WindDirection",
    "WindDirectionDegrees",
    "WindSpeedKMH",
    "WindSpeedGustKMH",
    "Humidity",
    "HourlyPrecipMM",
    "Conditions",
    "Clouds",
    "dailyrainMM",
    "SolarRadiationWatts/m^2",
    "SoftwareType",
    "DateUTC",
];

/// Legacy `WXDailyHistory.asp` endpoint, one CSV document per day.
#[derive(Debug, Clone)]
pub struct LegacyCsvSource {
    station_id: String,
    http: Client,
    base_url: String,
}

impl LegacyCsvSource {
    pub fn new(station_id: String, http: Client) -> Self {
        Self { station_id, http, base_url: ApiFormat::Csv.endpoint().to_string() }
    }

    /// Point at another host serving the same `WXDailyHistory.asp` format.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn query(&self, date: NaiveDate) -> Vec<(&'static str, String)> {
        vec![
            ("ID", self.station_id.clone()),
            ("graphspan", "day".to_string()),
            ("format", "0".to_string()),
            ("day", date.day().to_string()),
            ("month", date.month().to_string()),
            ("year", date.year().to_string()),
        ]
    }
}

#[async_trait]
impl ObservationSource for LegacyCsvSource {
    async fn fetch_day(&self, date: NaiveDate) -> Result<Vec<Point>, FetchError> {
        let body = get_body(&self.http, date, &self.base_url, &self.query(date)).await?;
        parse_history(&self.station_id, date, &body)
    }
}

/// Parse one day's CSV body. The whole day fails on the first bad line.
pub fn parse_history(station_id: &str, date: NaiveDate, body: &str) -> Result<Vec<Point>, FetchError> {
    let cleaned = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != "<br>")
        .map(|line| line.strip_suffix("<br>").unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(cleaned.as_bytes());

    let mut points = Vec::new();

    for (i, result) in reader.records().enumerate() {
        let record = result.map_err(|source| FetchError::Csv { date, source })?;

        if i == 0 {
            if !record.iter().eq(RECORD_NAMES.iter().copied()) {
                return Err(FetchError::Header {
                    date,
                    got: record.iter().map(str::to_string).collect(),
                    expected: RECORD_NAMES.iter().map(|s| s.to_string()).collect(),
                });
            }
            continue;
        }

        if record.len() < RECORD_NAMES.len() {
            return Err(FetchError::FieldCount {
                date,
                record: i,
                count: record.len(),
                expected: RECORD_NAMES.len(),
            });
        }

        let point = parse_record(&record, station_id)
            .map_err(|source| FetchError::Record { date, record: i, source })?;
        points.push(point);
    }

    Ok(points)
}

/// Map one data line to a point. Nothing is emitted unless every field parses.
pub fn parse_record(record: &StringRecord, station_id: &str) -> Result<Point, RecordError> {
    let raw_date = &record[15];
    let timestamp = NaiveDateTime::parse_from_str(raw_date, DATA_DATE_FORMAT)
        .map_err(|source| RecordError::Timestamp { value: raw_date.to_string(), source })?
        .and_utc();
    if epoch_nanos(&timestamp).is_none() {
        return Err(RecordError::OutOfRange { value: raw_date.to_string() });
    }

    let mut point = Point::new(station_id, timestamp);
    point.tag("software", &record[14]);

    point.field("temperature", float(record, 1, "temperature")?);
    point.field("dewpoint", float(record, 2, "dewpoint")?);
    point.field("pressure", float(record, 3, "pressure")?);
    point.field("wind_direction_name", record[4].to_string());
    point.field("wind_direction", float(record, 5, "wind direction")?);
    point.field("wind_speed", float(record, 6, "wind speed")?);
    point.field("wind_speed_gust", float(record, 7, "wind speed gust")?);
    point.field("humidity", integer(record, 8, "humidity")?);
    point.field("hourly_precipitation", float(record, 9, "hourly precipitation mm")?);
    point.field("solar_radiation", float(record, 13, "solar radiation")?);

    Ok(point)
}

fn float(record: &StringRecord, idx: usize, field: &'static str) -> Result<f64, RecordError> {
    let value = &record[idx];
    value
        .parse()
        .map_err(|source| RecordError::Float { field, value: value.to_string(), source })
}

fn integer(record: &StringRecord, idx: usize, field: &'static str) -> Result<i64, RecordError> {
    let value = &record[idx];
    value
        .parse()
        .map_err(|source| RecordError::Integer { field, value: value.to_string(), source })
}
