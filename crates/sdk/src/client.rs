//! Geostage Client Implementation

use crate::error::{Result, SdkError};
use crate::types::{
    MaintenanceRequest, MaintenanceResponse, StatsResponse, StatusRequest, StatusResponse,
    SubmitRequest, SubmitResponse,
};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use std::time::Duration;

/// Geostage Task Engine Client
///
/// Provides a high-level interface to interact with the daemon's
/// JSON-RPC surface.
///
/// # Example
///
/// ```no_run
/// use geostage_sdk::GeostageClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = GeostageClient::connect("http://127.0.0.1:9527").await?;
/// # Ok(())
/// # }
/// ```
pub struct GeostageClient {
    client: HttpClient,
}

impl GeostageClient {
    /// Connect to the daemon.
    ///
    /// # Arguments
    ///
    /// * `url` - RPC endpoint URL (e.g., `http://127.0.0.1:9527`)
    pub async fn connect(url: impl AsRef<str>) -> Result<Self> {
        let url = url.as_ref();

        let client = HttpClientBuilder::default()
            .request_timeout(Duration::from_secs(30))
            .build(url)
            .map_err(|e| SdkError::Connection(format!("Failed to create client: {}", e)))?;

        Ok(Self { client })
    }

    /// Submit a new job of the given type. Submission is idempotent per
    /// `(job_type, parameters)`: resubmitting returns the same `job_id`
    /// with `already_existed: true` instead of erroring.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use geostage_sdk::{GeostageClient, SubmitRequest};
    /// # use serde_json::json;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = GeostageClient::connect("http://127.0.0.1:9527").await?;
    /// let response = client
    ///     .submit("ingest_vector", SubmitRequest {
    ///         parameters: json!({"dataset_id": "parcels-2024"}),
    ///         ..Default::default()
    ///     })
    ///     .await?;
    ///
    /// println!("Job ID: {}", response.job_id);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit(
        &self,
        job_type: impl AsRef<str>,
        request: SubmitRequest,
    ) -> Result<SubmitResponse> {
        let method = format!("{}.submit.v1", job_type.as_ref());
        let params = rpc_params![request];
        let response: SubmitResponse = self.client.request(&method, params).await?;

        Ok(response)
    }

    /// Look up a job's current state.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use geostage_sdk::GeostageClient;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = GeostageClient::connect("http://127.0.0.1:9527").await?;
    /// let status = client.status("a1b2c3d4e5f60718-s0-1").await?;
    /// println!("status: {}", status.status);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn status(&self, job_id: impl Into<String>) -> Result<StatusResponse> {
        let request = StatusRequest {
            job_id: job_id.into(),
        };
        let params = rpc_params![request];
        let response: StatusResponse = self.client.request("job.status.v1", params).await?;

        Ok(response)
    }

    /// Fetch daemon-wide job counters and storage stats.
    pub async fn stats(&self) -> Result<StatsResponse> {
        let response: StatsResponse = self
            .client
            .request("admin.stats.v1", rpc_params![])
            .await?;

        Ok(response)
    }

    /// Trigger a maintenance pass (retention GC, optional ANALYZE).
    pub async fn maintenance(&self, force_analyze: bool) -> Result<MaintenanceResponse> {
        let request = MaintenanceRequest { force_analyze };
        let params = rpc_params![request];
        let response: MaintenanceResponse =
            self.client.request("admin.maintenance.v1", params).await?;

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_sdk_types() {
        // Basic smoke test to ensure SDK compiles
        // Integration tests require a running daemon
    }
}
