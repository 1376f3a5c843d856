use anyhow::{Context, Result};
use aircraft_digest::config::Thresholds;
use aircraft_digest::db::PgPool;
use aircraft_digest::ingest::IngestPipeline;
use aircraft_digest::store::PgTrackingStore;
use chrono::Utc;
use tracing::info;

/// Run a single archive pass outside the ingest loop.
///
/// Useful after the worker has been stopped: live paths that have since gone
/// stale are promoted or discarded, and stale live aircraft are pruned.
pub async fn handle_archive(pool: PgPool, thresholds: Thresholds) -> Result<()> {
    let pipeline = IngestPipeline::new(thresholds);
    let now = Utc::now();

    let summary = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().context("Failed to get database connection")?;
        let mut store = PgTrackingStore::new(&mut conn);
        pipeline.run_archive_pass(&mut store, now)
    })
    .await
    .context("Archive task panicked")??;

    info!(
        "Archive pass complete: {} paths promoted, {} discarded, {} live aircraft expired",
        summary.promoted, summary.discarded, summary.pruned_aircraft
    );
    Ok(())
}
