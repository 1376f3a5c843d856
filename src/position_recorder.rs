use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::trace;

use crate::aircraft_report::AircraftReport;
use crate::raw_positions::RawPositionRecord;
use crate::store::TrackingStore;

/// Append one report to the raw history.
///
/// Runs for every report, stale or not, with or without a position; the
/// geometry is simply null when the report carries no position.
pub fn record<S: TrackingStore + ?Sized>(
    store: &mut S,
    report: &AircraftReport,
    now: DateTime<Utc>,
) -> Result<()> {
    let record = RawPositionRecord::from_report(report, now);
    store.append_raw_position(&record)?;
    trace!(
        "Recorded raw position for {} (position: {})",
        report.hex,
        record.position.is_some()
    );
    Ok(())
}
