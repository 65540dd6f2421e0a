// Postgres TaskRepository implementation (spec §3 Task entity, §4.4,
// §4.5, §4.6, §4.7).

use async_trait::async_trait;
use geostage_core::domain::{Task, TaskId, TaskResultStatus, TaskStatus};
use geostage_core::error::{AppError, Result};
use geostage_core::port::{CompleteOutcome, TaskRepository, TimeProvider};
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

fn parse_task_status(s: &str) -> TaskStatus {
    match s {
        "QUEUED" => TaskStatus::Queued,
        "PROCESSING" => TaskStatus::Processing,
        "COMPLETED" => TaskStatus::Completed,
        "FAILED" => TaskStatus::Failed,
        "RETRYING" => TaskStatus::Retrying,
        "PENDING_RETRY" => TaskStatus::PendingRetry,
        "CANCELLED" => TaskStatus::Cancelled,
        other => panic!("unknown task status in database: {other}"),
    }
}

fn result_status_to_sql(status: TaskResultStatus) -> &'static str {
    match status {
        TaskResultStatus::Completed => "COMPLETED",
        TaskResultStatus::Failed => "FAILED",
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    task_id: String,
    parent_job_id: String,
    job_type: String,
    task_type: String,
    stage: i32,
    task_index: i32,
    parameters: serde_json::Value,
    status: String,
    result_data: Option<serde_json::Value>,
    error_details: Option<String>,
    retry_count: i32,
    retry_ready_at: Option<i64>,
    heartbeat: Option<i64>,
    next_stage_params: Option<serde_json::Value>,
    created_at: i64,
    updated_at: i64,
}

impl TaskRow {
    fn into_task(self) -> Task {
        Task {
            task_id: self.task_id,
            parent_job_id: self.parent_job_id,
            job_type: self.job_type,
            task_type: self.task_type,
            stage: self.stage,
            task_index: self.task_index,
            parameters: self.parameters,
            status: parse_task_status(&self.status),
            result_data: self.result_data,
            error_details: self.error_details,
            retry_count: self.retry_count,
            retry_ready_at: self.retry_ready_at,
            heartbeat: self.heartbeat,
            next_stage_params: self.next_stage_params,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

pub struct PgTaskRepository {
    pool: PgPool,
    time_provider: Arc<dyn TimeProvider>,
}

impl PgTaskRepository {
    pub fn new(pool: PgPool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self { pool, time_provider }
    }
}

#[async_trait]
impl TaskRepository for PgTaskRepository {
    async fn seed_stage(&self, tasks: &[Task]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for task in tasks {
            sqlx::query(
                r#"
                INSERT INTO tasks (
                    task_id, parent_job_id, job_type, task_type, stage, task_index,
                    parameters, status, result_data, error_details, retry_count,
                    retry_ready_at, heartbeat, next_stage_params, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                "#,
            )
            .bind(&task.task_id)
            .bind(&task.parent_job_id)
            .bind(&task.job_type)
            .bind(&task.task_type)
            .bind(task.stage)
            .bind(task.task_index)
            .bind(&task.parameters)
            .bind(task.status.to_string())
            .bind(&task.result_data)
            .bind(&task.error_details)
            .bind(task.retry_count)
            .bind(task.retry_ready_at)
            .bind(task.heartbeat)
            .bind(&task.next_stage_params)
            .bind(task.created_at)
            .bind(task.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn find_by_id(&self, task_id: &TaskId) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE task_id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(TaskRow::into_task))
    }

    async fn find_by_job_stage_index(
        &self,
        parent_job_id: &str,
        stage: i32,
        task_index: i32,
    ) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(
            "SELECT * FROM tasks WHERE parent_job_id = $1 AND stage = $2 AND task_index = $3",
        )
        .bind(parent_job_id)
        .bind(stage)
        .bind(task_index)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(TaskRow::into_task))
    }

    async fn find_by_job_and_stage(&self, parent_job_id: &str, stage: i32) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE parent_job_id = $1 AND stage = $2 ORDER BY task_index ASC",
        )
        .bind(parent_job_id)
        .bind(stage)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TaskRow::into_task).collect())
    }

    async fn claim(&self, task_id: &TaskId) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            UPDATE tasks
            SET status = 'PROCESSING', heartbeat = $2, updated_at = $2
            WHERE task_id = $1 AND status IN ('QUEUED', 'PENDING_RETRY')
            RETURNING *
            "#,
        )
        .bind(task_id)
        .bind(self.time_provider.now_millis())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(TaskRow::into_task))
    }

    async fn complete_and_check_stage(
        &self,
        task_id: &TaskId,
        parent_job_id: &str,
        stage: i32,
        status: TaskResultStatus,
        result_data: Option<&serde_json::Value>,
        error_details: Option<&str>,
        next_stage_params: Option<&serde_json::Value>,
    ) -> Result<CompleteOutcome> {
        let row: (bool, bool, i64) = sqlx::query_as(
            "SELECT updated, is_last, remaining FROM complete_task_and_check_stage($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(task_id)
        .bind(parent_job_id)
        .bind(stage)
        .bind(result_status_to_sql(status))
        .bind(result_data)
        .bind(error_details)
        .bind(self.time_provider.now_millis())
        .bind(next_stage_params)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(CompleteOutcome {
            updated: row.0,
            is_last: row.1,
            remaining: row.2,
        })
    }

    async fn schedule_retry(&self, task_id: &TaskId, retry_ready_at: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'RETRYING', retry_count = retry_count + 1,
                retry_ready_at = $2, updated_at = $3
            WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .bind(retry_ready_at)
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn requeue_retry(&self, task_id: &TaskId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'PENDING_RETRY', retry_ready_at = NULL, updated_at = $2
            WHERE task_id = $1 AND status = 'RETRYING'
            "#,
        )
        .bind(task_id)
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_ready_retries(&self, now_millis: i64) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE status = 'RETRYING' AND retry_ready_at <= $1 ORDER BY retry_ready_at ASC",
        )
        .bind(now_millis)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TaskRow::into_task).collect())
    }

    async fn mark_failed(&self, task_id: &TaskId, error_details: &str) -> Result<()> {
        sqlx::query(
            "UPDATE tasks SET status = 'FAILED', error_details = $2, updated_at = $3 WHERE task_id = $1",
        )
        .bind(task_id)
        .bind(error_details)
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update_heartbeat(&self, task_id: &TaskId) -> Result<()> {
        let now = self.time_provider.now_millis();
        sqlx::query("UPDATE tasks SET heartbeat = $2, updated_at = $2 WHERE task_id = $1 AND status = 'PROCESSING'")
            .bind(task_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn count_non_terminal(&self, parent_job_id: &str, stage: i32) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tasks WHERE parent_job_id = $1 AND stage = $2 AND status NOT IN ('COMPLETED', 'FAILED')",
        )
        .bind(parent_job_id)
        .bind(stage)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(count)
    }

    async fn find_stale_heartbeats(&self, timeout_ms: i64, now_millis: i64) -> Result<Vec<Task>> {
        let cutoff = now_millis - timeout_ms;
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE status = 'PROCESSING' AND heartbeat < $1 ORDER BY heartbeat ASC",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TaskRow::into_task).collect())
    }

    async fn find_orphaned_queued(&self, older_than_ms: i64, now_millis: i64) -> Result<Vec<Task>> {
        let cutoff = now_millis - older_than_ms;
        let rows: Vec<TaskRow> = sqlx::query_as(
            r#"
            SELECT t.* FROM tasks t
            JOIN jobs j ON j.job_id = t.parent_job_id
            WHERE t.status = 'QUEUED'
              AND t.created_at < $1
              AND j.status = 'PROCESSING'
              AND j.stage = t.stage
            ORDER BY t.created_at ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TaskRow::into_task).collect())
    }
}
