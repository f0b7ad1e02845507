use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use influxdb::{Timestamp, Type, WriteQuery};

/// Tag value shared by every point this crate produces.
pub const PROVIDER_TAG: &str = "wunderground";

/// A single measurement value attached to a point.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Text(String),
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&FieldValue> for Type {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Float(v) => Type::Float(*v),
            FieldValue::Integer(v) => Type::SignedInteger(*v),
            FieldValue::Text(v) => Type::Text(v.clone()),
        }
    }
}

/// A timestamped, tagged observation ready for time-series storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub timestamp: DateTime<Utc>,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Point {
    /// New point carrying the `station` and `provider` tags.
    pub fn new(station: &str, timestamp: DateTime<Utc>) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert("station".to_string(), station.to_string());
        tags.insert("provider".to_string(), PROVIDER_TAG.to_string());

        Self { timestamp, tags, fields: BTreeMap::new() }
    }

    pub fn tag(&mut self, key: &str, value: impl Into<String>) {
        self.tags.insert(key.to_string(), value.into());
    }

    pub fn field(&mut self, key: &str, value: impl Into<FieldValue>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// Set the field only when a value is present.
    pub fn field_opt<V: Into<FieldValue>>(&mut self, key: &str, value: Option<V>) {
        if let Some(v) = value {
            self.field(key, v);
        }
    }

    /// Convert to an InfluxDB write with nanosecond precision.
    pub fn to_write_query(&self, measurement: &str) -> Result<WriteQuery> {
        let nanos = epoch_nanos(&self.timestamp).ok_or_else(|| {
            anyhow!("Timestamp {} cannot be written with nanosecond precision", self.timestamp)
        })?;

        let mut query = WriteQuery::new(Timestamp::Nanoseconds(nanos), measurement);
        for (key, value) in &self.tags {
            query = query.add_tag(key.as_str(), value.as_str());
        }
        for (key, value) in &self.fields {
            query = query.add_field(key.as_str(), Type::from(value));
        }

        Ok(query)
    }
}

/// Nanoseconds since the Unix epoch, or `None` when InfluxDB cannot store the instant.
///
/// Line-protocol timestamps are unsigned here, so anything before 1970 or past
/// 2262 is unrepresentable. Mappers check this so a bad record fails only its day.
pub fn epoch_nanos(timestamp: &DateTime<Utc>) -> Option<u128> {
    timestamp.timestamp_nanos_opt().and_then(|n| u128::try_from(n).ok())
}

/// All points gathered by one run, bound for a single measurement and database.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub measurement: String,
    pub database: String,
    pub points: Vec<Point>,
}

impl Batch {
    pub fn new(measurement: impl Into<String>, database: impl Into<String>) -> Self {
        Self { measurement: measurement.into(), database: database.into(), points: Vec::new() }
    }

    pub fn extend(&mut self, points: impl IntoIterator<Item = Point>) {
        self.points.extend(points);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn write_queries(&self) -> Result<Vec<WriteQuery>> {
        self.points.iter().map(|p| p.to_write_query(&self.measurement)).collect()
    }
}

/// Inclusive range of UTC calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Days from `start` to `end` in ascending order; empty when `start > end`.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use influxdb::Query;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn date_range_is_inclusive_and_ascending() {
        let range = DateRange::new(date(2024, 2, 27), date(2024, 3, 1));
        let days: Vec<_> = range.days().collect();

        assert_eq!(days, vec![date(2024, 2, 27), date(2024, 2, 28), date(2024, 2, 29), date(2024, 3, 1)]);
    }

    #[test]
    fn reversed_range_yields_no_days() {
        let range = DateRange::new(date(2024, 3, 2), date(2024, 3, 1));
        assert!(range.is_empty());
        assert_eq!(range.days().count(), 0);
    }

    #[test]
    fn point_carries_station_and_provider_tags() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let point = Point::new("KXXTEST1", ts);

        assert_eq!(point.tags["station"], "KXXTEST1");
        assert_eq!(point.tags["provider"], "wunderground");
    }

    #[test]
    fn write_query_line_ends_with_nanoseconds() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut point = Point::new("KXXTEST1", ts);
        point.field("temperature", 21.5);
        point.field("humidity", 55i64);

        let line = point.to_write_query("weather").unwrap().build().unwrap().get();

        assert!(line.starts_with("weather,"));
        assert!(line.contains("temperature=21.5"));
        assert!(line.contains("humidity=55i"));
        assert!(line.ends_with(" 1714564800000000000"));
    }

    #[test]
    fn epoch_nanos_rejects_pre_epoch_and_far_future() {
        let before = Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 0).unwrap();
        let epoch = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        let far = Utc.with_ymd_and_hms(2300, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(epoch_nanos(&before), None);
        assert_eq!(epoch_nanos(&epoch), Some(0));
        assert_eq!(epoch_nanos(&far), None);
        assert!(Point::new("KXXTEST1", before).to_write_query("weather").is_err());
    }

    #[test]
    fn field_opt_skips_missing_values() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut point = Point::new("KXXTEST1", ts);
        point.field_opt("uv_high", None::<f64>);
        point.field_opt("dewpoint", Some(9.0));

        assert!(!point.fields.contains_key("uv_high"));
        assert_eq!(point.fields["dewpoint"], FieldValue::Float(9.0));
    }
}
