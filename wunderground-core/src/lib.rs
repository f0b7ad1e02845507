//! Core library for the `wunderground-import` CLI.
//!
//! This crate defines:
//! - Configuration, both the stored file and the resolved per-run settings
//! - The two Weather Underground history APIs behind one `ObservationSource` trait
//! - The date range driver that gathers a batch of points
//! - Printing and uploading that batch as InfluxDB line protocol

pub mod config;
pub mod driver;
pub mod error;
pub mod model;
pub mod provider;
pub mod sink;

pub use config::{Config, ImportConfig, ImportFlags, InfluxConfig};
pub use driver::collect_batch;
pub use error::{FetchError, RecordError};
pub use model::{Batch, DateRange, FieldValue, Point};
pub use provider::{ApiFormat, ObservationSource, source_from_config};
