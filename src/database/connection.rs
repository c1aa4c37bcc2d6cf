//! # Connection Pool and Migrations

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use super::errors::StoreResult;
use crate::config::DatabaseConfig;

/// Open a pool sized from configuration
pub async fn create_pool(config: &DatabaseConfig) -> StoreResult<PgPool> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        acquire_timeout_ms = config.acquire_timeout_ms,
        "Initializing database pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect(&config.database_url())
        .await?;

    info!(size = pool.size(), "Database pool initialized");
    Ok(pool)
}

/// Apply the embedded `migrations/` directory
pub async fn run_migrations(pool: &PgPool) -> StoreResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}
