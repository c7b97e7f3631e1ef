//! Database migration utilities

use crate::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Embedded schema migrations
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Apply all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations");
    MIGRATOR.run(pool).await?;
    info!("Database migrations completed successfully");
    Ok(())
}

/// Latest successfully applied migration version, `None` on a fresh database
pub async fn current_version(pool: &SqlitePool) -> Result<Option<i64>> {
    let tables: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    if tables == 0 {
        return Ok(None);
    }

    let version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?;
    Ok(version)
}

/// Check whether embedded migrations are newer than the database schema
pub async fn needs_migration(pool: &SqlitePool) -> Result<bool> {
    let latest = MIGRATOR.iter().map(|m| m.version).max();
    Ok(current_version(pool).await? < latest)
}
