// Job repository port (spec §3 Job entity, §4.3, §4.5, §4.7)

use crate::domain::{Job, JobId, JobStatus};
use crate::error::Result;
use async_trait::async_trait;

/// Result of the `advance_job_stage` stored routine (spec §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageAdvanceOutcome {
    /// `false` means the guard `WHERE stage=?` found no match — a
    /// duplicate StageDone delivery against an already-advanced job.
    pub updated: bool,
    pub new_stage: i32,
    pub is_final: bool,
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Inserts a Queued row at stage 1 unless a row with this `job_id`
    /// already exists. Returns `true` if a new row was inserted (spec
    /// §4.3 submit, §9 "single INSERT path" design note).
    async fn insert_if_absent(&self, job: &Job) -> Result<bool>;

    async fn find_by_id(&self, job_id: &JobId) -> Result<Option<Job>>;

    /// Atomic `WHERE status='queued'` transition to Processing (spec
    /// §4.3 on_job_start). Returns `false` if the job was not Queued.
    async fn transition_to_processing(&self, job_id: &JobId) -> Result<bool>;

    /// The `advance_job_stage` stored routine (spec §4.5). Appends
    /// `stage_result` under `stage_results[current_stage]` and advances
    /// `stage` by one, completing the job if `stage+1 > total_stages`.
    async fn advance_stage(
        &self,
        job_id: &JobId,
        current_stage: i32,
        stage_result: &serde_json::Value,
    ) -> Result<StageAdvanceOutcome>;

    /// Sets the final `result_data` and terminal status (Completed or
    /// CompletedWithErrors) — spec §4.3 finalize. Guarded on the job
    /// still being Processing, so a job the janitor already failed on
    /// deadline can't be overwritten by a late-arriving finalize (spec
    /// invariant 7, "terminal statuses are sticky"). Returns `false`
    /// when the guard misses.
    async fn finalize(
        &self,
        job_id: &JobId,
        result_data: &serde_json::Value,
        status: JobStatus,
    ) -> Result<bool>;

    /// Marks a job Failed outside the normal advance path (planner bug,
    /// deadline exceeded — spec §4.4 step 2, SPEC_FULL §4.3).
    async fn mark_failed(&self, job_id: &JobId, error_details: &str) -> Result<()>;

    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>>;

    /// Jobs in Queued state older than `older_than_ms` (spec §4.7 "Stuck
    /// Queued jobs").
    async fn find_stuck_queued(&self, older_than_ms: i64) -> Result<Vec<Job>>;
}
