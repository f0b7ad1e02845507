use std::{io::Write, time::Duration};

use anyhow::{Context, Result, anyhow};
use influxdb::{Client, Query};
use log::info;

use crate::{config::InfluxConfig, model::Batch};

/// How long the pre-write ping may take before the upload is abandoned.
pub const PING_TIMEOUT: Duration = Duration::from_secs(1);

/// Render every point as a line-protocol row with a nanosecond timestamp.
pub fn render_lines(batch: &Batch) -> Result<Vec<String>> {
    batch
        .write_queries()?
        .iter()
        .map(|q| -> Result<String> {
            Ok(q.build().context("Failed to build line protocol for point")?.get())
        })
        .collect()
}

pub fn print_batch(batch: &Batch, out: &mut impl Write) -> Result<()> {
    for line in render_lines(batch)? {
        writeln!(out, "{line}").context("Failed to write point to output")?;
    }
    Ok(())
}

/// Write the whole batch to InfluxDB in one request.
///
/// Unlike per-day fetch errors, every failure here is returned to the caller.
pub async fn upload_batch(influx: &InfluxConfig, batch: &Batch) -> Result<()> {
    let queries = batch.write_queries()?;

    let mut client = Client::new(influx.addr.as_str(), batch.database.as_str());
    if let Some(user) = &influx.user {
        client = client.with_auth(user.as_str(), influx.password.as_deref().unwrap_or_default());
    }

    let (build_type, version) = tokio::time::timeout(PING_TIMEOUT, client.ping())
        .await
        .map_err(|_| anyhow!("InfluxDB at {} did not answer ping within {PING_TIMEOUT:?}", influx.addr))?
        .with_context(|| format!("Failed to ping InfluxDB at {}", influx.addr))?;
    info!("Connected to InfluxDB {build_type} {version} at {}", influx.addr);

    if queries.is_empty() {
        info!("No points to upload");
        drop(client);
        return Ok(());
    }

    let count = queries.len();
    client
        .query(queries)
        .await
        .with_context(|| format!("Failed to write {count} points to database {}", batch.database))?;
    drop(client);

    info!("Uploaded {count} points to {}/{}", influx.addr, batch.database);
    Ok(())
}
