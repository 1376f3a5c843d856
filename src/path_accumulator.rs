//! Per-flight track accumulation
//!
//! `seen` keeps a path alive; `seen_pos` decides whether the position in the
//! same report is trustworthy enough to become part of the track. A report
//! with a stale position still refreshes `last_seen`, so the path is not
//! archived while the aircraft is still being heard.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::aircraft_report::{AircraftReport, Position};
use crate::config::{Thresholds, seconds_to_delta};
use crate::live_paths::{LivePath, PathKey};
use crate::store::TrackingStore;
use crate::track_points::TrackPoints;

/// What `upsert_path` did with a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathUpdate {
    /// A new path row was created (with or without a first point)
    Created { with_point: bool },
    /// An existing path got a new point
    Appended,
    /// An existing path was kept alive without a new point
    Touched,
}

/// The report's position, if it is fresh enough to extend a track
pub fn usable_position(report: &AircraftReport, thresholds: &Thresholds) -> Option<Position> {
    let seen_pos = report.seen_pos?;
    if seconds_to_delta(seen_pos) > thresholds.position_fresh {
        return None;
    }
    report.position
}

pub fn upsert_path<S: TrackingStore + ?Sized>(
    store: &mut S,
    report: &AircraftReport,
    now: DateTime<Utc>,
    thresholds: &Thresholds,
) -> Result<PathUpdate> {
    let key = PathKey::new(report.hex.clone(), report.flight_key());
    let last_seen = report.last_seen_at(now);
    let position = usable_position(report, thresholds);

    let Some(mut path) = store.find_live_path(&key)? else {
        let path = LivePath {
            key,
            category: report.category.clone(),
            start_time: now,
            last_seen,
            points: position.map(TrackPoints::starting_at).unwrap_or_default(),
        };
        store.insert_live_path(&path)?;
        debug!("Started live path {} (first point: {})", path.key, position.is_some());
        return Ok(PathUpdate::Created {
            with_point: position.is_some(),
        });
    };

    path.category = report.category.clone();
    path.last_seen = last_seen;

    let outcome = match position {
        Some(position) => {
            path.points.push(position);
            PathUpdate::Appended
        }
        None => PathUpdate::Touched,
    };

    store.update_live_path(&path)?;
    Ok(outcome)
}
