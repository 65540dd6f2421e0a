//! SDK Request/Response Types
//!
//! Mirrors the JSON-RPC types from the api-rpc crate.

use serde::{Deserialize, Serialize};

/// Request to submit a new job. The job type is carried in the RPC
/// method name (`{job_type}.submit.v1`), not in this body.
///
/// `dataset_id`/`resource_id`/`version_id`/`data_type` are optional and
/// all-or-nothing: set all four to opt into request-level idempotency
/// (a resubmission under the same identifiers resolves to the same job
/// even if `parameters` differs), or leave them unset to dedup purely
/// on `parameters`.
#[derive(Debug, Clone, Serialize, Default)]
pub struct SubmitRequest {
    pub parameters: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

/// Response from a submit operation.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub already_existed: bool,
    pub monitor_uri: String,
}

/// Request to look up a job's current state.
#[derive(Debug, Clone, Serialize)]
pub struct StatusRequest {
    pub job_id: String,
}

/// Response from a status lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub job_id: String,
    pub job_type: String,
    pub status: String,
    pub stage: i32,
    pub total_stages: i32,
    pub result_data: Option<serde_json::Value>,
    pub error_details: Option<String>,
}

/// Response from the stats operation.
#[derive(Debug, Clone, Deserialize)]
pub struct StatsResponse {
    pub total_jobs: i64,
    pub queued_jobs: i64,
    pub processing_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    pub completed_with_errors_jobs: i64,
    pub db_size_bytes: i64,
    pub uptime_seconds: i64,
}

/// Request to run maintenance.
#[derive(Debug, Clone, Serialize, Default)]
pub struct MaintenanceRequest {
    #[serde(default)]
    pub force_analyze: bool,
}

/// Response from a maintenance run.
#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceResponse {
    pub analyze_run: bool,
    pub jobs_deleted: i64,
    pub janitor_runs_deleted: i64,
    pub db_size_before: i64,
    pub db_size_after: i64,
}
