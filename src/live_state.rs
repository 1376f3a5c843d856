use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::aircraft_report::AircraftReport;
use crate::config::{Thresholds, seconds_to_delta};
use crate::live_aircraft::LiveAircraftState;
use crate::store::TrackingStore;

/// What `upsert_live` did with a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveUpdate {
    Written,
    /// `seen` exceeded the staleness threshold (or was missing); live state untouched
    SkippedStale,
}

/// True when the report is too old to be allowed into live state.
/// A report without a trustworthy `seen` is always stale.
pub fn is_stale_report(report: &AircraftReport, thresholds: &Thresholds) -> bool {
    match report.seen {
        Some(seen) => seconds_to_delta(seen) > thresholds.stale_after,
        None => true,
    }
}

/// Replace the live row for this aircraft, unless the report is a stale echo.
///
/// Stale reports are skipped rather than deleting anything: expiry belongs to
/// the archive pass, which runs once per tick.
pub fn upsert_live<S: TrackingStore + ?Sized>(
    store: &mut S,
    report: &AircraftReport,
    now: DateTime<Utc>,
    thresholds: &Thresholds,
) -> Result<LiveUpdate> {
    if is_stale_report(report, thresholds) {
        debug!(
            "Skipping live update for {}: seen {:?}s exceeds {}s",
            report.hex,
            report.seen,
            thresholds.stale_after.num_seconds()
        );
        return Ok(LiveUpdate::SkippedStale);
    }

    let state = LiveAircraftState::from_report(report, now);
    store.replace_live_aircraft(&state)?;
    Ok(LiveUpdate::Written)
}
