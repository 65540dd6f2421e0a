// Task repository port (spec §3 Task entity, §4.4, §4.5, §4.6, §4.7)

use crate::domain::{Task, TaskId, TaskResultStatus};
use crate::error::Result;
use async_trait::async_trait;

/// Result of the `complete_task_and_check_stage` stored routine (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompleteOutcome {
    /// `false` if the guarded UPDATE matched zero rows — duplicate
    /// delivery or the task wasn't Processing.
    pub updated: bool,
    /// `true` if this caller observed zero remaining non-terminal
    /// siblings under the stage's advisory lock. Only this caller may
    /// publish StageDone.
    pub is_last: bool,
    pub remaining: i64,
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Batch-inserts all of a stage's task rows in Queued state inside a
    /// single transaction keyed on `(parent_job_id, stage)` (spec §4.4
    /// step 4).
    async fn seed_stage(&self, tasks: &[Task]) -> Result<()>;

    async fn find_by_id(&self, task_id: &TaskId) -> Result<Option<Task>>;

    async fn find_by_job_stage_index(
        &self,
        parent_job_id: &str,
        stage: i32,
        task_index: i32,
    ) -> Result<Option<Task>>;

    /// All tasks belonging to one `(parent_job_id, stage)` pair, used to
    /// assemble the stage's result summary when the last task completes
    /// (spec §4.5) — the StageDone message itself carries only
    /// `job_id`/`stage` (spec §6 "small typed envelope").
    async fn find_by_job_and_stage(&self, parent_job_id: &str, stage: i32) -> Result<Vec<Task>>;

    /// Claim protocol (spec §4.6): `WHERE status IN ('queued',
    /// 'pending_retry')`. Returns `None` if the task was already taken.
    async fn claim(&self, task_id: &TaskId) -> Result<Option<Task>>;

    /// The `complete_task_and_check_stage` stored routine (spec §4.5).
    async fn complete_and_check_stage(
        &self,
        task_id: &TaskId,
        parent_job_id: &str,
        stage: i32,
        status: TaskResultStatus,
        result_data: Option<&serde_json::Value>,
        error_details: Option<&str>,
        next_stage_params: Option<&serde_json::Value>,
    ) -> Result<CompleteOutcome>;

    /// First half of the retry transition (spec §4.6 `Processing
    /// ──transient-error──► Retrying`): increments `retry_count` and
    /// parks the task in `Retrying` with `retry_ready_at` set to when
    /// its backoff delay elapses.
    async fn schedule_retry(&self, task_id: &TaskId, retry_ready_at: i64) -> Result<()>;

    /// Second half (spec §4.6 `Retrying ──requeue──► PendingRetry`):
    /// guarded `WHERE status = 'RETRYING'` transition, so the janitor's
    /// ready-retry sweep can never requeue (and re-publish TaskStart
    /// for) the same task twice.
    async fn requeue_retry(&self, task_id: &TaskId) -> Result<bool>;

    /// Retrying tasks whose backoff delay has elapsed (spec §4.6, §4.7).
    async fn find_ready_retries(&self, now_millis: i64) -> Result<Vec<Task>>;

    async fn mark_failed(&self, task_id: &TaskId, error_details: &str) -> Result<()>;

    async fn update_heartbeat(&self, task_id: &TaskId) -> Result<()>;

    /// Non-terminal count for a `(parent_job_id, stage)` pair (used by the
    /// janitor's stage-completion sanity sweep, spec §4.7).
    async fn count_non_terminal(&self, parent_job_id: &str, stage: i32) -> Result<i64>;

    /// Tasks Processing with `heartbeat < now - timeout_ms` (spec §4.7
    /// "Stale heartbeats").
    async fn find_stale_heartbeats(&self, timeout_ms: i64, now_millis: i64) -> Result<Vec<Task>>;

    /// Tasks still Queued, older than `older_than_ms`, whose parent job is
    /// Processing and whose `stage` matches the job's current stage (spec
    /// §4.7 "Orphaned Queued tasks" — a join against `jobs` is expected
    /// of the implementation).
    async fn find_orphaned_queued(&self, older_than_ms: i64, now_millis: i64) -> Result<Vec<Task>>;
}
