// Postgres connection pool setup (teacher's infra-sqlite/connection.rs
// pattern: env-driven pool sizing, adapted to `PgPoolOptions`).

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Creates a Postgres connection pool.
///
/// # Configuration
/// - `GEOSTAGE_POOL_SIZE`: max connections (default: 20)
/// - `GEOSTAGE_POOL_TIMEOUT`: acquire timeout in seconds (default: 5)
pub async fn create_pool(database_url: &str) -> Result<PgPool, Box<dyn std::error::Error>> {
    let max_connections: u32 = std::env::var("GEOSTAGE_POOL_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(20);

    let acquire_timeout_secs: u64 = std::env::var("GEOSTAGE_POOL_TIMEOUT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(acquire_timeout_secs))
        .connect(database_url)
        .await
        .map_err(|e| geostage_core::error::AppError::Database(e.to_string()))?;

    Ok(pool)
}
