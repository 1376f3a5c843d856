use anyhow::{Context, Result};
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

// Embed migrations into the binary
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/");

/// Build the connection pool. The ingest loop only ever holds one connection,
/// a couple more cover the one-shot commands.
pub fn build_pool(database_url: &str) -> Result<PgPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(4)
        .build(manager)
        .context("Failed to create database connection pool")
}

/// Apply pending migrations; returns how many were applied
pub fn run_migrations(conn: &mut PgConnection) -> Result<usize> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Failed to run database migrations: {}", e))?;
    for version in &applied {
        info!("Applied migration {}", version);
    }
    Ok(applied.len())
}
