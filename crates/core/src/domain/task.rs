// Task domain model

use serde::{Deserialize, Serialize};

pub type TaskId = String;

/// Task lifecycle state, transitions only along the graph in spec §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Retrying,
    PendingRetry,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Queued => write!(f, "QUEUED"),
            TaskStatus::Processing => write!(f, "PROCESSING"),
            TaskStatus::Completed => write!(f, "COMPLETED"),
            TaskStatus::Failed => write!(f, "FAILED"),
            TaskStatus::Retrying => write!(f, "RETRYING"),
            TaskStatus::PendingRetry => write!(f, "PENDING_RETRY"),
            TaskStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// One parallel unit of work within one stage of one job (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub parent_job_id: String,
    pub job_type: String,
    pub task_type: String,
    pub stage: i32,
    pub task_index: i32,
    pub parameters: serde_json::Value,
    pub status: TaskStatus,
    pub result_data: Option<serde_json::Value>,
    pub error_details: Option<String>,
    pub retry_count: i32,
    /// Set while `status == Retrying`: the epoch-ms the backoff delay
    /// elapses and the janitor's ready-retry sweep requeues the task to
    /// PendingRetry (spec §4.6 `Retrying ──requeue──► PendingRetry`).
    pub retry_ready_at: Option<i64>,
    /// Updated by long-running handlers; stale heartbeats are reclaimed by
    /// the janitor (spec §4.6, §4.7).
    pub heartbeat: Option<i64>,
    /// Optional handoff to the same-index task in stage+1 ("lineage").
    pub next_stage_params: Option<serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    pub fn new(
        task_id: impl Into<String>,
        parent_job_id: impl Into<String>,
        job_type: impl Into<String>,
        task_type: impl Into<String>,
        stage: i32,
        task_index: i32,
        parameters: serde_json::Value,
        now_millis: i64,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            parent_job_id: parent_job_id.into(),
            job_type: job_type.into(),
            task_type: task_type.into(),
            stage,
            task_index,
            parameters,
            status: TaskStatus::Queued,
            result_data: None,
            error_details: None,
            retry_count: 0,
            retry_ready_at: None,
            heartbeat: None,
            next_stage_params: None,
            created_at: now_millis,
            updated_at: now_millis,
        }
    }
}

/// A planner-declared unit of stage work, before IDs or bookkeeping are
/// attached (spec §4.2 `plan_stage`, §4.4 stage seeding step 1).
#[derive(Debug, Clone)]
pub struct TaskPlan {
    pub task_type: String,
    pub task_index: i32,
    pub parameters: serde_json::Value,
}

/// Outcome a handler reports back to the executor (spec §4.6 handler
/// contract).
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub status: TaskResultStatus,
    pub result_data: Option<serde_json::Value>,
    pub error_details: Option<String>,
    pub next_stage_params: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskResultStatus {
    Completed,
    Failed,
}
