// DB maintenance port (SPEC_FULL §2 ambient "janitor_runs" GC sweep)
//
// No blob/artifact store sits behind this domain (spec §1 Out of scope), so
// the teacher's artifact-GC surface is dropped here; everything else is
// kept (see DESIGN.md).

use crate::error::Result;
use async_trait::async_trait;

/// Database maintenance statistics
#[derive(Debug, Clone)]
pub struct MaintenanceStats {
    pub db_size_mb: f64,
    pub db_size_bytes: i64,
    pub job_count: i64,
    pub finished_job_count: i64,
    pub fragmentation_percent: f64,
}

/// Maintenance configuration
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Retention period for finished jobs and their tasks (days)
    pub finished_job_retention_days: i64,

    /// Retention period for `janitor_runs` history rows (days)
    pub janitor_run_retention_days: i64,

    /// Threshold above which `ANALYZE` is forced
    pub max_db_size_mb: f64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            finished_job_retention_days: 30,
            janitor_run_retention_days: 7,
            max_db_size_mb: 10_000.0,
        }
    }
}

/// Database maintenance operations
#[async_trait]
pub trait Maintenance: Send + Sync {
    /// Runs `ANALYZE` to refresh the planner's statistics.
    ///
    /// # Returns
    /// Space reclaimed in MB (always 0.0 for ANALYZE; kept for parity with
    /// the teacher's VACUUM-returns-reclaimed-space shape).
    async fn analyze(&self) -> Result<f64>;

    /// Deletes finished jobs (and, via cascade delete, their tasks) older
    /// than the retention period.
    async fn gc_finished_jobs(&self, retention_days: i64) -> Result<i64>;

    /// Deletes `janitor_runs` history rows older than the retention period.
    async fn gc_janitor_runs(&self, retention_days: i64) -> Result<i64>;

    async fn get_stats(&self) -> Result<MaintenanceStats>;

    /// Runs all maintenance operations based on config.
    async fn run_full_maintenance(&self, config: &MaintenanceConfig) -> Result<MaintenanceStats> {
        let stats_before = self.get_stats().await?;

        let deleted_jobs = self
            .gc_finished_jobs(config.finished_job_retention_days)
            .await?;
        let deleted_runs = self
            .gc_janitor_runs(config.janitor_run_retention_days)
            .await?;

        if stats_before.db_size_mb > config.max_db_size_mb {
            self.analyze().await?;
        }

        let stats_after = self.get_stats().await?;

        tracing::info!(
            deleted_jobs = deleted_jobs,
            deleted_janitor_runs = deleted_runs,
            db_size_mb = stats_after.db_size_mb,
            "maintenance completed"
        );

        Ok(stats_after)
    }
}
