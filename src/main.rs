use aircraft_digest::config::{IngestConfigFile, IngestSettings};
use aircraft_digest::db::{build_pool, run_migrations};
use aircraft_digest::log_format::TargetFirstFormat;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::env;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser)]
#[command(name = "aircraft-digest")]
#[command(version, about = "Turns receiver aircraft snapshots into live state and archived flight paths")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the receiver snapshot and maintain live state, live paths and history
    Ingest {
        /// Path to the receiver's aircraft.json
        #[arg(long)]
        data_file: Option<PathBuf>,

        /// Seconds between polls
        #[arg(long)]
        poll_interval_secs: Option<f64>,

        /// Serve Prometheus metrics on this port
        #[arg(long)]
        metrics_port: Option<u16>,

        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Run a single archive pass and exit
    Archive {
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Apply pending database migrations and exit
    Migrate,
}

/// Lifecycle thresholds; each overrides the config file, which overrides the defaults
#[derive(Args, Default)]
struct TuningArgs {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Staleness threshold in seconds (live-state gate, expiry and archival)
    #[arg(long)]
    stale_after_secs: Option<f64>,

    /// Maximum seen_pos in seconds for a position to extend a track
    #[arg(long)]
    position_fresh_secs: Option<f64>,

    /// Minimum track duration in seconds for promotion
    #[arg(long)]
    min_duration_secs: Option<f64>,

    /// Minimum number of track points for promotion
    #[arg(long)]
    min_points: Option<usize>,

    /// Minimum track length in kilometers for promotion
    #[arg(long)]
    min_distance_km: Option<f64>,
}

impl TuningArgs {
    fn resolve(self, overrides: IngestConfigFile) -> Result<IngestSettings> {
        let file = match &self.config {
            Some(path) => IngestConfigFile::load(path)?,
            None => IngestConfigFile::default(),
        };
        let cli = IngestConfigFile {
            stale_after_secs: self.stale_after_secs,
            position_fresh_secs: self.position_fresh_secs,
            min_duration_secs: self.min_duration_secs,
            min_points: self.min_points,
            min_distance_km: self.min_distance_km,
            ..overrides
        };
        IngestSettings::try_from(file.merged_with(cli)).context("Invalid ingest configuration")
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .event_format(TargetFirstFormat::new(std::io::stderr().is_terminal()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(sentry_tracing::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let _sentry_guard = env::var("SENTRY_DSN")
        .ok()
        .filter(|dsn| !dsn.trim().is_empty())
        .map(|dsn| {
            sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    environment: env::var("AIRCRAFT_DIGEST_ENV").ok().map(Into::into),
                    ..Default::default()
                },
            ))
        });

    init_tracing();

    let cli = Cli::parse();

    let database_url =
        env::var("DATABASE_URL").context("DATABASE_URL must be set in environment variables")?;
    let pool = build_pool(&database_url)?;

    match cli.command {
        Commands::Ingest {
            data_file,
            poll_interval_secs,
            metrics_port,
            tuning,
        } => {
            let settings = tuning.resolve(IngestConfigFile {
                data_file,
                poll_interval_secs,
                metrics_port,
                ..Default::default()
            })?;

            let migration_pool = pool.clone();
            let applied = tokio::task::spawn_blocking(move || {
                let mut conn = migration_pool.get()?;
                run_migrations(&mut conn)
            })
            .await??;
            if applied > 0 {
                info!("Applied {} pending migration(s)", applied);
            }

            commands::handle_ingest(pool, settings).await
        }
        Commands::Archive { tuning } => {
            let settings = tuning.resolve(IngestConfigFile::default())?;
            commands::handle_archive(pool, settings.thresholds).await
        }
        Commands::Migrate => commands::handle_migrate(pool).await,
    }
}
