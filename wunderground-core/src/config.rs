use anyhow::{Context, Result, anyhow};
use chrono::{Days, NaiveDate};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{model::DateRange, provider::ApiFormat};

pub const DEFAULT_INFLUX_ADDR: &str = "http://localhost:8086";
pub const DEFAULT_INFLUX_DB: &str = "weather";
pub const DEFAULT_MEASUREMENT: &str = "weather";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Date format accepted for `--start-date` / `--end-date`.
pub const FLAG_DATE_FORMAT: &str = "%Y-%m-%d";

/// InfluxDB connection settings as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct InfluxSection {
    pub addr: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

/// Persistent defaults stored on disk.
///
/// Example TOML:
/// ```toml
/// api_key = "..."
/// station_id = "KXXTEST1"
/// format = "json"
///
/// [influx]
/// addr = "http://localhost:8086"
/// database = "weather"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub api_key: Option<String>,
    pub station_id: Option<String>,
    /// "csv" or "json".
    pub format: Option<String>,
    pub measurement: Option<String>,
    #[serde(default)]
    pub influx: InfluxSection,
}

impl Config {
    /// Stored API format, if one is set.
    pub fn format(&self) -> Result<Option<ApiFormat>> {
        self.format.as_deref().map(str::parse).transpose()
    }

    pub fn set_format(&mut self, format: ApiFormat) {
        self.format = Some(format.as_str().to_string());
    }

    /// Load config from the platform path, or an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "wunderground-import", "wunderground-import")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// Values given on the command line. `None` falls back to the config file, then defaults.
#[derive(Debug, Clone, Default)]
pub struct ImportFlags {
    pub upload: bool,
    pub influx_addr: Option<String>,
    pub influx_user: Option<String>,
    pub influx_password: Option<String>,
    pub influx_db: Option<String>,
    pub measurement: Option<String>,
    pub station_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub api_key: Option<String>,
    pub format: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InfluxConfig {
    pub addr: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: String,
}

/// Fully resolved settings for one import run.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportConfig {
    pub station_id: String,
    pub range: DateRange,
    pub format: ApiFormat,
    pub api_key: Option<String>,
    pub measurement: String,
    pub upload: bool,
    pub influx: InfluxConfig,
    pub http_timeout: Duration,
}

impl ImportConfig {
    /// Merge flags over the stored config. `today` is the UTC date the defaults derive from.
    pub fn resolve(flags: ImportFlags, file: &Config, today: NaiveDate) -> Result<Self> {
        let start = match flags.start_date.as_deref() {
            Some(s) => parse_flag_date(s).context("Invalid --start-date")?,
            None => today
                .checked_sub_days(Days::new(1))
                .ok_or_else(|| anyhow!("Cannot compute the day before {today}"))?,
        };
        let end = match flags.end_date.as_deref() {
            Some(s) => parse_flag_date(s).context("Invalid --end-date")?,
            None => today,
        };

        let station_id = flags
            .station_id
            .or_else(|| file.station_id.clone())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow!("Please specify a station ID (--station-id)"))?;

        let format: ApiFormat = match flags.format.as_deref() {
            Some(s) => s.parse()?,
            None => file.format()?.unwrap_or_default(),
        };

        let api_key = flags.api_key.or_else(|| file.api_key.clone()).filter(|k| !k.is_empty());

        let influx = InfluxConfig {
            addr: flags
                .influx_addr
                .or_else(|| file.influx.addr.clone())
                .unwrap_or_else(|| DEFAULT_INFLUX_ADDR.to_string()),
            user: flags.influx_user.or_else(|| file.influx.user.clone()).filter(|u| !u.is_empty()),
            password: flags.influx_password.or_else(|| file.influx.password.clone()),
            database: flags
                .influx_db
                .or_else(|| file.influx.database.clone())
                .unwrap_or_else(|| DEFAULT_INFLUX_DB.to_string()),
        };

        Ok(Self {
            station_id,
            range: DateRange::new(start, end),
            format,
            api_key,
            measurement: flags
                .measurement
                .or_else(|| file.measurement.clone())
                .unwrap_or_else(|| DEFAULT_MEASUREMENT.to_string()),
            upload: flags.upload,
            influx,
            http_timeout: flags.timeout_secs.map(Duration::from_secs).unwrap_or(DEFAULT_HTTP_TIMEOUT),
        })
    }
}

pub fn parse_flag_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), FLAG_DATE_FORMAT)
        .with_context(|| format!("Expected a date as yyyy-mm-dd, got {value:?}"))
}
