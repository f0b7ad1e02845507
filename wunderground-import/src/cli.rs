use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use inquire::{Password, Select, Text};
use log::info;
use wunderground_core::{
    ApiFormat, Config, ImportConfig, ImportFlags, collect_batch,
    config::{DEFAULT_INFLUX_ADDR, DEFAULT_INFLUX_DB, DEFAULT_MEASUREMENT},
    sink, source_from_config,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "wunderground-import",
    version,
    about = "Import Weather Underground station history into InfluxDB",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub import: ImportArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store default station, API key and InfluxDB settings.
    Configure {
        /// Config file to write instead of the platform default.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Upload data to InfluxDB, otherwise the points are printed as line protocol.
    #[arg(long)]
    pub upload: bool,

    /// InfluxDB HTTP address [default: http://localhost:8086]
    #[arg(long, env = "INFLUX_ADDR")]
    pub influx_addr: Option<String>,

    #[arg(long, env = "INFLUX_USER")]
    pub influx_user: Option<String>,

    #[arg(long, env = "INFLUX_PASSWORD", hide_env_values = true)]
    pub influx_password: Option<String>,

    /// InfluxDB database [default: weather]
    #[arg(long)]
    pub influx_db: Option<String>,

    /// Measurement name [default: weather]
    #[arg(long = "measurement-name")]
    pub measurement: Option<String>,

    /// Weather Underground station ID.
    #[arg(short = 'i', long)]
    pub station_id: Option<String>,

    /// Start date (yyyy-mm-dd), default is yesterday.
    #[arg(short = 's', long)]
    pub start_date: Option<String>,

    /// End date (yyyy-mm-dd), default is today.
    #[arg(short = 'e', long)]
    pub end_date: Option<String>,

    /// weather.com API key, required for the json format.
    #[arg(long, env = "WUNDERGROUND_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Which history API to query [default: json]
    #[arg(long, value_parser = ["csv", "json"])]
    pub format: Option<String>,

    /// HTTP timeout per request, in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Config file to read instead of the platform default.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl ImportArgs {
    pub fn to_flags(&self) -> ImportFlags {
        ImportFlags {
            upload: self.upload,
            influx_addr: self.influx_addr.clone(),
            influx_user: self.influx_user.clone(),
            influx_password: self.influx_password.clone(),
            influx_db: self.influx_db.clone(),
            measurement: self.measurement.clone(),
            station_id: self.station_id.clone(),
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            api_key: self.api_key.clone(),
            format: self.format.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Some(Command::Configure { config }) => configure(config),
            None => import(self.import).await,
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

async fn import(args: ImportArgs) -> anyhow::Result<()> {
    let file = load_config(args.config.as_ref())?;
    let config = ImportConfig::resolve(args.to_flags(), &file, Utc::now().date_naive())?;
    let source = source_from_config(&config)?;

    info!("Station {} via {}", config.station_id, config.format);

    let batch =
        collect_batch(source.as_ref(), config.range, &config.measurement, &config.influx.database)
            .await;

    if config.upload {
        sink::upload_batch(&config.influx, &batch).await
    } else {
        let stdout = std::io::stdout();
        sink::print_batch(&batch, &mut stdout.lock())
    }
}

fn configure(path: Option<PathBuf>) -> anyhow::Result<()> {
    let mut cfg = load_config(path.as_ref())?;

    let station = Text::new("Station ID:")
        .with_initial_value(cfg.station_id.as_deref().unwrap_or_default())
        .prompt()?;
    cfg.station_id = Some(station.trim().to_string()).filter(|s| !s.is_empty());

    let current = cfg.format()?.unwrap_or_default();
    let format = Select::new("History API:", ApiFormat::all().to_vec())
        .with_starting_cursor(ApiFormat::all().iter().position(|f| *f == current).unwrap_or(0))
        .prompt()?;
    cfg.set_format(format);

    if format.requires_api_key() {
        let key = Password::new("weather.com API key (leave empty to keep current):")
            .without_confirmation()
            .prompt()?;
        if !key.is_empty() {
            cfg.api_key = Some(key);
        }
    }

    let measurement = Text::new("Measurement name:")
        .with_default(cfg.measurement.as_deref().unwrap_or(DEFAULT_MEASUREMENT))
        .prompt()?;
    cfg.measurement = Some(measurement);

    let addr = Text::new("InfluxDB address:")
        .with_default(cfg.influx.addr.as_deref().unwrap_or(DEFAULT_INFLUX_ADDR))
        .prompt()?;
    cfg.influx.addr = Some(addr);

    let database = Text::new("InfluxDB database:")
        .with_default(cfg.influx.database.as_deref().unwrap_or(DEFAULT_INFLUX_DB))
        .prompt()?;
    cfg.influx.database = Some(database);

    let user = Text::new("InfluxDB username (optional):")
        .with_initial_value(cfg.influx.user.as_deref().unwrap_or_default())
        .prompt()?;
    cfg.influx.user = Some(user).filter(|u| !u.is_empty());

    if cfg.influx.user.is_some() {
        let password = Password::new("InfluxDB password (leave empty to keep current):")
            .without_confirmation()
            .prompt()?;
        if !password.is_empty() {
            cfg.influx.password = Some(password);
        }
    }

    let saved = match path {
        Some(path) => cfg.save_to(&path).map(|_| path),
        None => cfg.save(),
    }
    .context("Failed to save configuration")?;

    println!("Configuration saved to {}", saved.display());
    Ok(())
}
