//! Errors for a single day's fetch.
//!
//! These never abort a run: the driver logs them and moves on to the next day.
//! Fatal setup and upload failures use `anyhow` instead.

use chrono::NaiveDate;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{date}: request to {url} failed: {source}")]
    Request {
        date: NaiveDate,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{date}: {url} returned status {status}: {body}")]
    Status { date: NaiveDate, url: String, status: StatusCode, body: String },

    #[error("{date}: invalid header line, got {got:?}, expected {expected:?}")]
    Header { date: NaiveDate, got: Vec<String>, expected: Vec<String> },

    #[error("{date}: record {record} has {count} fields, expected at least {expected}")]
    FieldCount { date: NaiveDate, record: usize, count: usize, expected: usize },

    #[error("{date}: malformed CSV body: {source}")]
    Csv {
        date: NaiveDate,
        #[source]
        source: csv::Error,
    },

    #[error("{date}: error while parsing record {record}: {source}")]
    Record {
        date: NaiveDate,
        record: usize,
        #[source]
        source: RecordError,
    },

    #[error("{date}: failed to decode observations JSON: {source}")]
    Decode {
        date: NaiveDate,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn date(&self) -> NaiveDate {
        match self {
            FetchError::Request { date, .. }
            | FetchError::Status { date, .. }
            | FetchError::Header { date, .. }
            | FetchError::FieldCount { date, .. }
            | FetchError::Csv { date, .. }
            | FetchError::Record { date, .. }
            | FetchError::Decode { date, .. } => *date,
        }
    }
}

/// A single CSV record that could not be mapped to a point.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to parse date {value:?}: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("timestamp {value} is outside the range InfluxDB can store (1970-01-01 to 2262-04-11)")]
    OutOfRange { value: String },

    #[error("failed to parse {field} {value:?}: {source}")]
    Float {
        field: &'static str,
        value: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    #[error("failed to parse {field} {value:?}: {source}")]
    Integer {
        field: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
}
