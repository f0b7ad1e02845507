use log::{debug, error, info, warn};

use crate::{
    model::{Batch, DateRange},
    provider::ObservationSource,
};

/// Fetch every day in `range`, oldest first, into one batch.
///
/// A day that fails is logged and contributes no points; the run carries on.
pub async fn collect_batch(
    source: &dyn ObservationSource,
    range: DateRange,
    measurement: &str,
    database: &str,
) -> Batch {
    let mut batch = Batch::new(measurement, database);

    if range.is_empty() {
        warn!("Start date {} is after end date {}, nothing to fetch", range.start, range.end);
        return batch;
    }

    info!("Fetching observations for {range}");

    let mut failed_days = 0usize;
    for day in range.days() {
        match source.fetch_day(day).await {
            Ok(points) => {
                debug!("{day}: {} points", points.len());
                batch.extend(points);
            }
            Err(err) => {
                error!("failed to get points for {day}: {err}");
                failed_days += 1;
            }
        }
    }

    info!("Collected {} points ({failed_days} days failed)", batch.len());
    batch
}
