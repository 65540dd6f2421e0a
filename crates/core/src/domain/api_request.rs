// API request idempotency record (spec §3 "API request (thin)")

use serde::{Deserialize, Serialize};

/// Maps an external caller's identifiers to the job they produced, so a
/// resubmission under the same `(dataset_id, resource_id, version_id)`
/// resolves to the already-running job without re-deriving parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRequest {
    /// `SHA256(dataset_id + resource_id + version_id)`, hex-encoded.
    pub request_id: String,
    pub job_id: String,
    pub data_type: String,
    pub created_at: i64,
}

impl ApiRequest {
    pub fn new(
        request_id: impl Into<String>,
        job_id: impl Into<String>,
        data_type: impl Into<String>,
        now_millis: i64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            job_id: job_id.into(),
            data_type: data_type.into(),
            created_at: now_millis,
        }
    }
}
