use anyhow::{Context, Result};
use aircraft_digest::db::{PgPool, run_migrations};
use tracing::info;

pub async fn handle_migrate(pool: PgPool) -> Result<()> {
    let applied = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().context("Failed to get database connection")?;
        run_migrations(&mut conn)
    })
    .await
    .context("Migration task panicked")??;

    if applied == 0 {
        info!("Database schema is up to date");
    } else {
        info!("Applied {} migration(s)", applied);
    }
    Ok(())
}
