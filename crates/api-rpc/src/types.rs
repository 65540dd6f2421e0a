//! RPC Request/Response Types
//!
//! One submission method per registered job_type plus a generic
//! `job.status.v1` (SPEC_FULL §6).

use serde::{Deserialize, Serialize};

/// `{job_type}.submit.v1` — job_type is implied by the method name, so
/// the request carries the schema-declared parameters plus an optional
/// set of external identifiers for the spec §3 "API request (thin)"
/// idempotency record. The three identifier fields are all-or-nothing:
/// a caller that wants request-level dedup supplies all of them.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub dataset_id: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub version_id: Option<String>,
    #[serde(default)]
    pub data_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub already_existed: bool,
    pub monitor_uri: String,
}

/// `job.status.v1`
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub job_id: String,
    pub job_type: String,
    pub status: String,
    pub stage: i32,
    pub total_stages: i32,
    pub result_data: Option<serde_json::Value>,
    pub error_details: Option<String>,
}

/// `admin.stats.v1`
#[derive(Debug, Deserialize)]
pub struct StatsRequest {}

#[derive(Debug, Clone, Serialize)]
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

/// `admin.maintenance.v1`
#[derive(Debug, Deserialize)]
pub struct MaintenanceRequest {
    #[serde(default)]
    pub force_analyze: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceResponse {
    pub analyze_run: bool,
    pub jobs_deleted: i64,
    pub janitor_runs_deleted: i64,
    pub db_size_before: i64,
    pub db_size_after: i64,
}
