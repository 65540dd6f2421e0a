// Migration runner (teacher's infra-sqlite/migration.rs shape: a
// `schema_version` table gating sequential `include_str!`'d files),
// adapted to Postgres and to this crate's two migrations.

use sqlx::PgPool;
use tracing::info;

pub async fn run_migrations(pool: &PgPool) -> Result<(), Box<dyn std::error::Error>> {
    info!("running database migrations");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_version (version INT PRIMARY KEY, applied_at BIGINT NOT NULL)",
    )
    .execute(pool)
    .await?;

    let current_version: i32 =
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
            .fetch_one(pool)
            .await?;

    info!(current_version, "current schema version");

    if current_version < 1 {
        info!("applying migration 001: initial schema");
        apply_migration(pool, 1, include_str!("../migrations/001_initial_schema.sql")).await?;
    }

    if current_version < 2 {
        info!("applying migration 002: stage advance routines");
        apply_migration(
            pool,
            2,
            include_str!("../migrations/002_stage_advance_routines.sql"),
        )
        .await?;
    }

    if current_version < 3 {
        info!("applying migration 003: task retry_ready_at");
        apply_migration(
            pool,
            3,
            include_str!("../migrations/003_task_retry_ready_at.sql"),
        )
        .await?;
    }

    info!("all migrations applied");
    Ok(())
}

async fn apply_migration(pool: &PgPool, version: i32, sql: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut tx = pool.begin().await?;

    sqlx::raw_sql(sql).execute(&mut *tx).await?;

    let applied_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64;

    sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES ($1, $2)")
        .bind(version)
        .bind(applied_at)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
