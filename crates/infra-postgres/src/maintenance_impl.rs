// Postgres Maintenance implementation (SPEC_FULL §2 ambient
// "janitor_runs" GC sweep). `fragmentation_percent` reads Postgres's own
// dead-tuple bookkeeping rather than trying to reproduce SQLite's
// free-page accounting.

use async_trait::async_trait;
use geostage_core::error::{AppError, Result};
use geostage_core::port::{Maintenance, MaintenanceStats};
use sqlx::PgPool;

fn map_sqlx_error(err: sqlx::Error) -> AppError {
    AppError::Database(err.to_string())
}

pub struct PgMaintenance {
    pool: PgPool,
}

impl PgMaintenance {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn retention_cutoff_ms(now_ms: i64, retention_days: i64) -> i64 {
    now_ms - retention_days * 24 * 60 * 60 * 1000
}

#[async_trait]
impl Maintenance for PgMaintenance {
    async fn analyze(&self) -> Result<f64> {
        sqlx::raw_sql("ANALYZE jobs, tasks, api_requests, janitor_runs")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(0.0)
    }

    async fn gc_finished_jobs(&self, retention_days: i64) -> Result<i64> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let cutoff = retention_cutoff_ms(now_ms, retention_days);

        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE status IN ('COMPLETED', 'FAILED', 'COMPLETED_WITH_ERRORS')
              AND updated_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() as i64)
    }

    async fn gc_janitor_runs(&self, retention_days: i64) -> Result<i64> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let cutoff = retention_cutoff_ms(now_ms, retention_days);

        let result = sqlx::query("DELETE FROM janitor_runs WHERE run_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() as i64)
    }

    async fn get_stats(&self) -> Result<MaintenanceStats> {
        let db_size_bytes: i64 = sqlx::query_scalar("SELECT pg_database_size(current_database())")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let job_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let finished_job_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE status IN ('COMPLETED', 'FAILED', 'COMPLETED_WITH_ERRORS')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let fragmentation_percent: f64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(
                100.0 * SUM(n_dead_tup)::float8 / NULLIF(SUM(n_live_tup + n_dead_tup), 0),
                0.0
            )
            FROM pg_stat_user_tables
            WHERE relname IN ('jobs', 'tasks', 'api_requests', 'janitor_runs')
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(MaintenanceStats {
            db_size_mb: db_size_bytes as f64 / (1024.0 * 1024.0),
            db_size_bytes,
            job_count,
            finished_job_count,
            fragmentation_percent,
        })
    }
}
