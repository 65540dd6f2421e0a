//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::to_rpc_error;
use crate::rate_limiter::RateLimiter;
use crate::types::{
    MaintenanceRequest, MaintenanceResponse, StatsRequest, StatsResponse, StatusRequest,
    StatusResponse, SubmitRequest, SubmitResponse,
};
use geostage_core::application::{ApiRequestKey, Controller, JobRegistry};
use geostage_core::domain::JobStatus;
use geostage_core::error::AppError;
use geostage_core::port::{JobRepository, Maintenance};
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    controller: Arc<Controller>,
    job_repo: Arc<dyn JobRepository>,
    registry: Arc<JobRegistry>,
    maintenance: Arc<dyn Maintenance>,
    rate_limiter: Arc<RateLimiter>,
    start_time: std::time::Instant,
    monitor_uri_base: String,
}

impl RpcHandler {
    pub fn new(
        controller: Arc<Controller>,
        job_repo: Arc<dyn JobRepository>,
        registry: Arc<JobRegistry>,
        maintenance: Arc<dyn Maintenance>,
    ) -> Self {
        let max_burst: u32 = std::env::var("GEOSTAGE_RATE_LIMIT_BURST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(200);

        let rate_per_sec: u32 = std::env::var("GEOSTAGE_RATE_LIMIT_RATE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100);

        Self {
            controller,
            job_repo,
            registry,
            maintenance,
            rate_limiter: Arc::new(RateLimiter::new(max_burst, rate_per_sec)),
            start_time: std::time::Instant::now(),
            monitor_uri_base: std::env::var("GEOSTAGE_MONITOR_URI_BASE")
                .unwrap_or_else(|_| "https://localhost/jobs".to_string()),
        }
    }

    async fn rate_limited(&self) -> Result<(), ErrorObjectOwned> {
        if !self.rate_limiter.check().await {
            return Err(jsonrpsee::types::error::ErrorObject::owned(
                crate::error::code::THROTTLED,
                "rate limit exceeded, please slow down",
                None::<()>,
            ));
        }
        Ok(())
    }

    /// `{job_type}.submit.v1`
    pub async fn submit(
        &self,
        job_type: &str,
        params: SubmitRequest,
    ) -> Result<SubmitResponse, ErrorObjectOwned> {
        self.rate_limited().await?;

        let api_request = match (
            params.dataset_id,
            params.resource_id,
            params.version_id,
            params.data_type,
        ) {
            (Some(dataset_id), Some(resource_id), Some(version_id), Some(data_type)) => {
                Some(ApiRequestKey {
                    dataset_id,
                    resource_id,
                    version_id,
                    data_type,
                })
            }
            _ => None,
        };

        let outcome = self
            .controller
            .submit(job_type, params.parameters, api_request)
            .await
            .map_err(to_rpc_error)?;

        Ok(SubmitResponse {
            monitor_uri: format!("{}/{}", self.monitor_uri_base, outcome.job_id),
            job_id: outcome.job_id,
            already_existed: outcome.already_existed,
        })
    }

    /// `job.status.v1`
    pub async fn status(&self, params: StatusRequest) -> Result<StatusResponse, ErrorObjectOwned> {
        let job = self
            .job_repo
            .find_by_id(&params.job_id)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| {
                to_rpc_error(AppError::NotFound(format!(
                    "job {} not found",
                    params.job_id
                )))
            })?;

        Ok(StatusResponse {
            job_id: job.job_id,
            job_type: job.job_type,
            status: job.status.to_string(),
            stage: job.stage,
            total_stages: job.total_stages,
            result_data: job.result_data,
            error_details: job.error_details,
        })
    }

    /// `admin.stats.v1`
    pub async fn stats(&self, _params: StatsRequest) -> Result<StatsResponse, ErrorObjectOwned> {
        let queued = self
            .job_repo
            .find_by_status(JobStatus::Queued)
            .await
            .map_err(to_rpc_error)?
            .len() as i64;

        let processing = self
            .job_repo
            .find_by_status(JobStatus::Processing)
            .await
            .map_err(to_rpc_error)?
            .len() as i64;

        let completed = self
            .job_repo
            .find_by_status(JobStatus::Completed)
            .await
            .map_err(to_rpc_error)?
            .len() as i64;

        let failed = self
            .job_repo
            .find_by_status(JobStatus::Failed)
            .await
            .map_err(to_rpc_error)?
            .len() as i64;

        let completed_with_errors = self
            .job_repo
            .find_by_status(JobStatus::CompletedWithErrors)
            .await
            .map_err(to_rpc_error)?
            .len() as i64;

        let stats = self.maintenance.get_stats().await.map_err(to_rpc_error)?;

        Ok(StatsResponse {
            total_jobs: stats.job_count,
            queued_jobs: queued,
            processing_jobs: processing,
            completed_jobs: completed,
            failed_jobs: failed,
            completed_with_errors_jobs: completed_with_errors,
            db_size_bytes: stats.db_size_bytes,
            uptime_seconds: self.start_time.elapsed().as_secs() as i64,
        })
    }

    /// `admin.maintenance.v1`
    pub async fn maintenance(
        &self,
        params: MaintenanceRequest,
    ) -> Result<MaintenanceResponse, ErrorObjectOwned> {
        let stats_before = self.maintenance.get_stats().await.map_err(to_rpc_error)?;

        let analyze_run = if params.force_analyze || stats_before.fragmentation_percent > 10.0 {
            self.maintenance.analyze().await.map_err(to_rpc_error)?;
            true
        } else {
            false
        };

        let jobs_deleted = self
            .maintenance
            .gc_finished_jobs(30)
            .await
            .map_err(to_rpc_error)?;

        let janitor_runs_deleted = self
            .maintenance
            .gc_janitor_runs(7)
            .await
            .map_err(to_rpc_error)?;

        let stats_after = self.maintenance.get_stats().await.map_err(to_rpc_error)?;

        Ok(MaintenanceResponse {
            analyze_run,
            jobs_deleted,
            janitor_runs_deleted,
            db_size_before: stats_before.db_size_bytes,
            db_size_after: stats_after.db_size_bytes,
        })
    }

    pub fn registered_job_types(&self) -> Vec<String> {
        self.registry.job_types()
    }
}
