//! End-of-tick archive pass
//!
//! Every live path that has gone quiet for longer than the staleness threshold
//! is either promoted into the historical store (if it passes the quality
//! filter) or dropped. Either way it leaves the live store, so a second pass
//! with no new reports finds nothing to do. Live aircraft rows expire on the
//! same clock.

use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::Thresholds;
use crate::live_paths::LivePath;
use crate::store::TrackingStore;

/// Why a path was not promoted
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiscardReason {
    TooShort { duration: TimeDelta },
    TooFewPoints { points: usize },
    TooLittleDistance { distance_km: f64 },
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscardReason::TooShort { duration } => {
                write!(f, "duration {}s too short", duration.num_seconds())
            }
            DiscardReason::TooFewPoints { points } => write!(f, "only {} points", points),
            DiscardReason::TooLittleDistance { distance_km } => {
                write!(f, "only {:.3} km covered", distance_km)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Promote,
    Discard(DiscardReason),
}

/// Duration / point count / distance predicate gating promotion
#[derive(Debug, Clone, Copy)]
pub struct QualityFilter {
    pub min_duration: TimeDelta,
    pub min_points: usize,
    pub min_distance_km: f64,
}

impl From<&Thresholds> for QualityFilter {
    fn from(thresholds: &Thresholds) -> Self {
        Self {
            min_duration: thresholds.min_duration,
            min_points: thresholds.min_points,
            min_distance_km: thresholds.min_distance_km,
        }
    }
}

impl QualityFilter {
    pub fn evaluate(&self, path: &LivePath) -> Verdict {
        let duration = path.duration();
        if duration < self.min_duration {
            return Verdict::Discard(DiscardReason::TooShort { duration });
        }
        let points = path.point_count();
        if points < self.min_points {
            return Verdict::Discard(DiscardReason::TooFewPoints { points });
        }
        let distance_km = path.total_length_km();
        if distance_km < self.min_distance_km {
            return Verdict::Discard(DiscardReason::TooLittleDistance { distance_km });
        }
        Verdict::Promote
    }
}

/// Counts from one archive pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub promoted: usize,
    pub discarded: usize,
    pub pruned_aircraft: usize,
}

impl ArchiveSummary {
    pub fn expired_paths(&self) -> usize {
        self.promoted + self.discarded
    }
}

/// Promote or discard every stale live path, then prune stale live aircraft.
///
/// Must run inside the tick's transaction so promotion, deletion and pruning
/// commit together.
pub fn archive_stale<S: TrackingStore + ?Sized>(
    store: &mut S,
    now: DateTime<Utc>,
    thresholds: &Thresholds,
) -> Result<ArchiveSummary> {
    let cutoff = thresholds.stale_cutoff(now);
    let filter = QualityFilter::from(thresholds);
    let mut summary = ArchiveSummary::default();

    for path in store.live_paths_before(cutoff)? {
        let key = path.key.clone();
        match filter.evaluate(&path) {
            Verdict::Promote => {
                let points = path.point_count();
                let historical = path.into_historical();
                if store.insert_historical_path(&historical)? {
                    info!(
                        "Archived path {} ({} points, {:.2} km, {}s)",
                        key,
                        points,
                        historical.total_length_km,
                        (historical.end_time - historical.start_time).num_seconds()
                    );
                } else {
                    warn!(
                        "Historical path {} starting {} already exists, not duplicating",
                        key, historical.start_time
                    );
                }
                summary.promoted += 1;
                metrics::counter!("archive.paths.promoted").increment(1);
            }
            Verdict::Discard(reason) => {
                debug!("Discarding path {}: {}", key, reason);
                summary.discarded += 1;
                metrics::counter!("archive.paths.discarded").increment(1);
            }
        }
        store.delete_live_path(&key)?;
    }

    summary.pruned_aircraft = store.delete_live_aircraft_before(cutoff)?;
    metrics::counter!("archive.aircraft.pruned").increment(summary.pruned_aircraft as u64);

    Ok(summary)
}
