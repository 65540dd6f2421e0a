// Postgres JobRepository implementation (spec §3 Job entity, §4.3,
// §4.5, §4.7). The `advance_stage` method's SQL body is one call into
// the `advance_job_stage` stored routine (migrations/002) — spec §4.5's
// design note forbids reimplementing that guard/lock/merge logic here.

use async_trait::async_trait;
use geostage_core::domain::{Job, JobId, JobStatus};
use geostage_core::error::{AppError, Result};
use geostage_core::port::{JobRepository, StageAdvanceOutcome, TimeProvider};
use sqlx::PgPool;
use std::sync::Arc;

fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("23505") => AppError::Conflict(format!("unique constraint violated: {}", db_err.message())),
            Some("23503") => AppError::Database(format!("foreign key violation: {}", db_err.message())),
            Some(code) => AppError::Database(format!("database error [{code}]: {}", db_err.message())),
            None => AppError::Database(db_err.message().to_string()),
        },
        sqlx::Error::RowNotFound => AppError::NotFound("row not found".to_string()),
        other => AppError::Database(other.to_string()),
    }
}

fn parse_job_status(s: &str) -> JobStatus {
    match s {
        "QUEUED" => JobStatus::Queued,
        "PROCESSING" => JobStatus::Processing,
        "COMPLETED" => JobStatus::Completed,
        "FAILED" => JobStatus::Failed,
        "COMPLETED_WITH_ERRORS" => JobStatus::CompletedWithErrors,
        other => panic!("unknown job status in database: {other}"),
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    job_id: String,
    job_type: String,
    parameters: serde_json::Value,
    status: String,
    stage: i32,
    total_stages: i32,
    stage_results: serde_json::Value,
    result_data: Option<serde_json::Value>,
    error_details: Option<String>,
    deadline: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl JobRow {
    fn into_job(self) -> Job {
        Job {
            job_id: self.job_id,
            job_type: self.job_type,
            parameters: self.parameters,
            status: parse_job_status(&self.status),
            stage: self.stage,
            total_stages: self.total_stages,
            stage_results: self.stage_results,
            result_data: self.result_data,
            error_details: self.error_details,
            deadline: self.deadline,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

pub struct PgJobRepository {
    pool: PgPool,
    time_provider: Arc<dyn TimeProvider>,
}

impl PgJobRepository {
    pub fn new(pool: PgPool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self { pool, time_provider }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn insert_if_absent(&self, job: &Job) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (
                job_id, job_type, parameters, status, stage, total_stages,
                stage_results, result_data, error_details, deadline,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (job_id) DO NOTHING
            "#,
        )
        .bind(&job.job_id)
        .bind(&job.job_type)
        .bind(&job.parameters)
        .bind(job.status.to_string())
        .bind(job.stage)
        .bind(job.total_stages)
        .bind(&job.stage_results)
        .bind(&job.result_data)
        .bind(&job.error_details)
        .bind(job.deadline)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_id(&self, job_id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(JobRow::into_job))
    }

    async fn transition_to_processing(&self, job_id: &JobId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'PROCESSING', updated_at = $2 WHERE job_id = $1 AND status = 'QUEUED'",
        )
        .bind(job_id)
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn advance_stage(
        &self,
        job_id: &JobId,
        current_stage: i32,
        stage_result: &serde_json::Value,
    ) -> Result<StageAdvanceOutcome> {
        let row: (bool, i32, bool) = sqlx::query_as(
            "SELECT updated, new_stage, is_final FROM advance_job_stage($1, $2, $3, $4)",
        )
        .bind(job_id)
        .bind(current_stage)
        .bind(stage_result)
        .bind(self.time_provider.now_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(StageAdvanceOutcome {
            updated: row.0,
            new_stage: row.1,
            is_final: row.2,
        })
    }

    async fn finalize(
        &self,
        job_id: &JobId,
        result_data: &serde_json::Value,
        status: JobStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2, result_data = $3, updated_at = $4
            WHERE job_id = $1
              AND status NOT IN ('COMPLETED', 'FAILED', 'COMPLETED_WITH_ERRORS')
            "#,
        )
        .bind(job_id)
        .bind(status.to_string())
        .bind(result_data)
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(&self, job_id: &JobId, error_details: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'FAILED', error_details = $2, updated_at = $3
            WHERE job_id = $1
              AND status NOT IN ('COMPLETED', 'FAILED', 'COMPLETED_WITH_ERRORS')
            "#,
        )
        .bind(job_id)
        .bind(error_details)
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> =
            sqlx::query_as("SELECT * FROM jobs WHERE status = $1 ORDER BY created_at ASC")
                .bind(status.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(JobRow::into_job).collect())
    }

    async fn find_stuck_queued(&self, older_than_ms: i64) -> Result<Vec<Job>> {
        let cutoff = self.time_provider.now_millis() - older_than_ms;
        let rows: Vec<JobRow> = sqlx::query_as(
            "SELECT * FROM jobs WHERE status = 'QUEUED' AND created_at < $1 ORDER BY created_at ASC",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(JobRow::into_job).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use geostage_core::port::time_provider::SystemTimeProvider;

    async fn setup() -> Option<(PgPool, Arc<dyn TimeProvider>)> {
        let url = std::env::var("GEOSTAGE_TEST_DATABASE_URL").ok()?;
        let pool = create_pool(&url).await.ok()?;
        run_migrations(&pool).await.ok()?;
        Some((pool, Arc::new(SystemTimeProvider)))
    }

    #[tokio::test]
    async fn insert_if_absent_is_idempotent() {
        let Some((pool, time_provider)) = setup().await else {
            eprintln!("skipping: GEOSTAGE_TEST_DATABASE_URL not set");
            return;
        };
        let repo = PgJobRepository::new(pool, time_provider.clone());
        let now = time_provider.now_millis();
        let job = Job::new("job-abc", "ingest_vector", serde_json::json!({}), 2, None, now);

        assert!(repo.insert_if_absent(&job).await.unwrap());
        assert!(!repo.insert_if_absent(&job).await.unwrap());
    }
}
