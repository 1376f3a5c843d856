use anyhow::{Context, Result};
use aircraft_digest::config::IngestSettings;
use aircraft_digest::db::PgPool;
use aircraft_digest::ingest::{IngestPipeline, TickSummary};
use aircraft_digest::instance_lock::InstanceLock;
use aircraft_digest::snapshot_reader::{FileSnapshotReader, SnapshotSource};
use aircraft_digest::store::PgTrackingStore;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Interval;
use tracing::{Instrument, error, info, info_span};

const LOCK_NAME: &str = "aircraft-digest-ingest";

/// Run the ingest worker: poll the snapshot, run one tick, sleep, repeat.
///
/// Exits cleanly on Ctrl+C between ticks; a tick in flight always finishes
/// (commits or rolls back) first.
pub async fn handle_ingest(pool: PgPool, settings: IngestSettings) -> Result<()> {
    let _instance_lock = InstanceLock::acquire(LOCK_NAME)?;

    if let Some(port) = settings.metrics_port {
        let metrics_handle = tokio::spawn(aircraft_digest::metrics::start_metrics_server(port));
        tokio::spawn(async move {
            match metrics_handle.await {
                Ok(()) => error!("Metrics server exited unexpectedly"),
                Err(e) => error!("Metrics server task panicked: {}", e),
            }
        });
    }

    let reader = FileSnapshotReader::new(settings.data_file.clone());
    let pipeline = IngestPipeline::new(settings.thresholds);

    info!("Starting ingest loop");
    info!("  Snapshot: {}", reader.path().display());
    info!("  Poll interval: {:?}", settings.poll_interval);
    info!(
        "  Stale after: {}s, position fresh within: {}s",
        settings.thresholds.stale_after.num_seconds(),
        settings.thresholds.position_fresh.num_seconds()
    );
    info!(
        "  Promotion: >= {}s, >= {} points, >= {} km",
        settings.thresholds.min_duration.num_seconds(),
        settings.thresholds.min_points,
        settings.thresholds.min_distance_km
    );

    let mut shutdown = spawn_shutdown_listener();
    let mut interval = tokio::time::interval(settings.poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut tick_number: u64 = 0;

    loop {
        if !next_tick(&mut interval, &mut shutdown).await {
            info!("Received shutdown signal, stopping ingest loop");
            break;
        }

        tick_number += 1;
        let span = info_span!("tick", n = tick_number);
        // Nothing from a failed tick was committed; the next poll retries
        if let Err(e) = run_one_tick(&pool, &reader, pipeline)
            .instrument(span)
            .await
        {
            error!("Tick abandoned: {:#}", e);
        }
    }

    Ok(())
}

/// Listen for SIGINT/SIGTERM for the life of the process; a signal that
/// arrives mid-tick is held until the loop next checks.
fn spawn_shutdown_listener() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = sigterm.recv() => info!("Received SIGTERM"),
                        result = tokio::signal::ctrl_c() => {
                            if let Err(e) = result {
                                error!("Failed to listen for SIGINT signal: {}", e);
                                return;
                            }
                            info!("Received SIGINT (Ctrl+C)");
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to register SIGTERM handler: {}", e);
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for SIGINT signal: {}", e);
                        return;
                    }
                    info!("Received SIGINT (Ctrl+C)");
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for SIGINT signal: {}", e);
                return;
            }
            info!("Received SIGINT (Ctrl+C)");
        }

        let _ = shutdown_tx.send(true);
    });

    shutdown_rx
}

/// Wait for the next poll. Returns false once shutdown has been requested.
async fn next_tick(interval: &mut Interval, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        biased;
        changed = shutdown.changed() => match changed {
            Ok(()) => false,
            // The listener gave up; keep polling without it
            Err(_) => {
                interval.tick().await;
                true
            }
        },
        _ = interval.tick() => true,
    }
}

async fn run_one_tick(
    pool: &PgPool,
    reader: &FileSnapshotReader,
    pipeline: IngestPipeline,
) -> Result<TickSummary> {
    let reports = reader.read_snapshot().await;
    metrics::gauge!("ingest.last_tick.reports").set(reports.len() as f64);

    let now = Utc::now();
    let pool = pool.clone();
    let span = tracing::Span::current();

    tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        let mut conn = pool.get().context("Failed to get database connection")?;
        let mut store = PgTrackingStore::new(&mut conn);
        pipeline.run_tick(&mut store, &reports, now)
    })
    .await
    .context("Ingest tick panicked")?
}
