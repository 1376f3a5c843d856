//! One ingest tick: per-report writes in isolated nested scopes, then one
//! archive pass, all inside a single outer transaction.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::aircraft_report::AircraftReport;
use crate::archiver::{ArchiveSummary, archive_stale};
use crate::config::Thresholds;
use crate::live_state::{LiveUpdate, upsert_live};
use crate::path_accumulator::{PathUpdate, upsert_path};
use crate::position_recorder;
use crate::store::TrackingStore;

/// Outcome of the three writes for a single report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOutcome {
    pub live: LiveUpdate,
    pub path: PathUpdate,
}

/// Counts from one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub reports: usize,
    pub recorded: usize,
    pub failed: usize,
    pub live_written: usize,
    pub live_skipped_stale: usize,
    pub paths_created: usize,
    pub points_appended: usize,
    pub archive: ArchiveSummary,
}

impl TickSummary {
    fn add(&mut self, outcome: ReportOutcome) {
        self.recorded += 1;
        match outcome.live {
            LiveUpdate::Written => self.live_written += 1,
            LiveUpdate::SkippedStale => self.live_skipped_stale += 1,
        }
        match outcome.path {
            PathUpdate::Created { with_point } => {
                self.paths_created += 1;
                if with_point {
                    self.points_appended += 1;
                }
            }
            PathUpdate::Appended => self.points_appended += 1,
            PathUpdate::Touched => {}
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestPipeline {
    thresholds: Thresholds,
}

impl IngestPipeline {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Run one full tick against `store`.
    ///
    /// A failure inside one report's scope rolls back only that report. Any
    /// other failure rolls back the whole tick and is returned; the caller
    /// retries on the next poll.
    pub fn run_tick<S: TrackingStore + ?Sized>(
        &self,
        store: &mut S,
        reports: &[AircraftReport],
        now: DateTime<Utc>,
    ) -> Result<TickSummary> {
        let started = Instant::now();
        store.begin()?;

        let result = self
            .process_batch(store, reports, now)
            .and_then(|summary| {
                store.commit().context("Failed to commit tick")?;
                Ok(summary)
            });

        match result {
            Ok(summary) => {
                metrics::histogram!("ingest.tick.duration_ms")
                    .record(started.elapsed().as_secs_f64() * 1000.0);
                Ok(summary)
            }
            Err(e) => {
                if let Err(rollback_err) = store.rollback() {
                    warn!("Rollback of abandoned tick failed: {:#}", rollback_err);
                }
                metrics::counter!("ingest.tick.failed").increment(1);
                Err(e)
            }
        }
    }

    /// Run only the archive pass, in its own transaction
    pub fn run_archive_pass<S: TrackingStore + ?Sized>(
        &self,
        store: &mut S,
        now: DateTime<Utc>,
    ) -> Result<ArchiveSummary> {
        store.begin()?;
        match archive_stale(store, now, &self.thresholds) {
            Ok(summary) => {
                store.commit().context("Failed to commit archive pass")?;
                Ok(summary)
            }
            Err(e) => {
                if let Err(rollback_err) = store.rollback() {
                    warn!("Rollback of archive pass failed: {:#}", rollback_err);
                }
                Err(e)
            }
        }
    }

    fn process_batch<S: TrackingStore + ?Sized>(
        &self,
        store: &mut S,
        reports: &[AircraftReport],
        now: DateTime<Utc>,
    ) -> Result<TickSummary> {
        let mut summary = TickSummary {
            reports: reports.len(),
            ..Default::default()
        };
        metrics::counter!("ingest.reports.received").increment(reports.len() as u64);

        for report in reports {
            store.begin_nested()?;
            match self.process_report(store, report, now) {
                Ok(outcome) => {
                    store.commit_nested()?;
                    summary.add(outcome);
                }
                Err(e) => {
                    warn!("Failed to ingest report for {}: {:#}", report.hex, e);
                    metrics::counter!("ingest.reports.failed").increment(1);
                    // If the scope itself cannot be rolled back, the connection is gone
                    store
                        .rollback_nested()
                        .with_context(|| format!("Failed to isolate report for {}", report.hex))?;
                    summary.failed += 1;
                }
            }
        }

        summary.archive = archive_stale(store, now, &self.thresholds)?;

        metrics::counter!("ingest.live.skipped_stale").increment(summary.live_skipped_stale as u64);
        metrics::counter!("ingest.paths.created").increment(summary.paths_created as u64);
        metrics::counter!("ingest.paths.appended").increment(summary.points_appended as u64);

        if summary.reports > 0 || summary.archive.expired_paths() > 0 {
            info!(
                "Tick: {} reports ({} failed, {} stale), {} paths started, {} points, {} archived, {} discarded, {} aircraft expired",
                summary.reports,
                summary.failed,
                summary.live_skipped_stale,
                summary.paths_created,
                summary.points_appended,
                summary.archive.promoted,
                summary.archive.discarded,
                summary.archive.pruned_aircraft
            );
        } else {
            debug!("Tick: nothing to do");
        }

        Ok(summary)
    }

    fn process_report<S: TrackingStore + ?Sized>(
        &self,
        store: &mut S,
        report: &AircraftReport,
        now: DateTime<Utc>,
    ) -> Result<ReportOutcome> {
        position_recorder::record(store, report, now)?;
        let live = upsert_live(store, report, now, &self.thresholds)?;
        let path = upsert_path(store, report, now, &self.thresholds)?;
        Ok(ReportOutcome { live, path })
    }
}
