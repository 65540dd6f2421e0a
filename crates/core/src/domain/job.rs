// Job domain model

use serde::{Deserialize, Serialize};

pub type JobId = String;

/// Job lifecycle state (spec §3 invariant 7: terminal states are sticky).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    CompletedWithErrors,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::CompletedWithErrors
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "QUEUED"),
            JobStatus::Processing => write!(f, "PROCESSING"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Failed => write!(f, "FAILED"),
            JobStatus::CompletedWithErrors => write!(f, "COMPLETED_WITH_ERRORS"),
        }
    }
}

/// Job entity (spec §3). `stage_results` accumulates one JSON value per
/// completed stage, keyed by stage number as a string (JSON object keys
/// must be strings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub job_type: String,
    pub parameters: serde_json::Value,
    pub status: JobStatus,
    pub stage: i32,
    pub total_stages: i32,
    pub stage_results: serde_json::Value,
    pub result_data: Option<serde_json::Value>,
    pub error_details: Option<String>,
    /// Absolute epoch-ms deadline, set at submit time from an optional
    /// `timeout_ms` schema field (SPEC_FULL §4.3 resolved Open Question).
    pub deadline: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Job {
    pub fn new(
        job_id: impl Into<String>,
        job_type: impl Into<String>,
        parameters: serde_json::Value,
        total_stages: i32,
        deadline: Option<i64>,
        now_millis: i64,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            job_type: job_type.into(),
            parameters,
            status: JobStatus::Queued,
            stage: 1,
            total_stages,
            stage_results: serde_json::json!({}),
            result_data: None,
            error_details: None,
            deadline,
            created_at: now_millis,
            updated_at: now_millis,
        }
    }

    pub fn is_deadline_exceeded(&self, now_millis: i64) -> bool {
        self.deadline.map(|d| now_millis > d).unwrap_or(false)
    }
}
