use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Initialize Prometheus metrics exporter
/// Returns a handle that can be used to render metrics for scraping
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        // Tick durations in milliseconds: 1ms .. 10s
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full("ingest.tick.duration_ms".to_string()),
            &[
                1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 10000.0,
            ],
        )?
        .install_recorder()?;
    Ok(handle)
}

/// Background task to update process metrics
/// Updates uptime and memory usage metrics every 5 seconds
pub async fn process_metrics_task() {
    let start_time = Instant::now();

    loop {
        metrics::gauge!("process.uptime.seconds").set(start_time.elapsed().as_secs_f64());
        metrics::gauge!("process.is_up").set(1.0);

        #[cfg(target_os = "linux")]
        {
            if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
                for line in status.lines() {
                    if line.starts_with("VmRSS:") {
                        // Parse RSS memory in kB
                        if let Some(kb_str) = line.split_whitespace().nth(1)
                            && let Ok(kb) = kb_str.parse::<f64>()
                        {
                            metrics::gauge!("process.memory.bytes").set(kb * 1024.0);
                        }
                        break;
                    }
                }
            }
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

/// Initialize ingest metrics to zero so they appear in Prometheus before the first event
pub fn initialize_ingest_metrics() {
    metrics::counter!("ingest.reports.received").absolute(0);
    metrics::counter!("ingest.reports.skipped_no_hex").absolute(0);
    metrics::counter!("ingest.reports.failed").absolute(0);
    metrics::counter!("ingest.live.skipped_stale").absolute(0);
    metrics::counter!("ingest.paths.created").absolute(0);
    metrics::counter!("ingest.paths.appended").absolute(0);
    metrics::counter!("ingest.snapshot.read_failed").absolute(0);
    metrics::counter!("ingest.tick.failed").absolute(0);

    metrics::counter!("archive.paths.promoted").absolute(0);
    metrics::counter!("archive.paths.discarded").absolute(0);
    metrics::counter!("archive.aircraft.pruned").absolute(0);

    metrics::gauge!("ingest.last_tick.reports").set(0.0);
}

/// Serve `/metrics` on the given port until the process exits
pub async fn start_metrics_server(port: u16) {
    let handle = match init_metrics() {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to install Prometheus recorder: {}", e);
            return;
        }
    };

    initialize_ingest_metrics();
    tokio::spawn(process_metrics_task());

    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting metrics server on http://{}/metrics", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind metrics server on {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Metrics server failed: {}", e);
    }
}
