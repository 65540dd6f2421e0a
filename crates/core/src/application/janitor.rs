// Janitor (spec §4.7): reconciles state the at-least-once broker and
// crashed workers can leave inconsistent. Observer-only — it never
// invents task results, only republishes, requeues, or synthesizes the
// StageDone signal when the task rows already agree it happened.
//
// Grounded on the teacher's `MaintenanceScheduler` periodic-tick shape
// (application/maintenance/mod.rs), generalized from "run VACUUM every N
// hours" to "run five sweeps every `janitor_interval`".

use crate::application::controller::Controller;
use crate::application::retry::RetryPolicy;
use crate::domain::{JobStatus, TaskResultStatus};
use crate::error::Result;
use crate::port::{BrokerMessage, BrokerPort, JobRepository, Queue, TaskRepository, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct JanitorConfig {
    pub interval_ms: i64,
    pub heartbeat_timeout_ms: i64,
    pub orphan_task_age_ms: i64,
    pub stuck_job_age_ms: i64,
    pub retry_budget: i32,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        use crate::application::worker::constants::*;
        Self {
            interval_ms: DEFAULT_JANITOR_INTERVAL_MS,
            heartbeat_timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,
            orphan_task_age_ms: DEFAULT_ORPHAN_TASK_AGE_MS,
            stuck_job_age_ms: DEFAULT_STUCK_JOB_AGE_MS,
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

/// Tallies what one sweep pass did, surfaced in logs and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct JanitorReport {
    pub stale_heartbeats_requeued: i64,
    pub stale_heartbeats_failed: i64,
    pub orphaned_tasks_republished: i64,
    pub stuck_jobs_republished: i64,
    pub stage_completions_synthesized: i64,
    pub deadlines_exceeded: i64,
    pub ready_retries_requeued: i64,
}

pub struct Janitor {
    job_repo: Arc<dyn JobRepository>,
    task_repo: Arc<dyn TaskRepository>,
    broker: Arc<dyn BrokerPort>,
    controller: Arc<Controller>,
    retry_policy: Arc<RetryPolicy>,
    time_provider: Arc<dyn TimeProvider>,
    config: JanitorConfig,
}

impl Janitor {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        task_repo: Arc<dyn TaskRepository>,
        broker: Arc<dyn BrokerPort>,
        controller: Arc<Controller>,
        retry_policy: Arc<RetryPolicy>,
        time_provider: Arc<dyn TimeProvider>,
        config: JanitorConfig,
    ) -> Self {
        Self {
            job_repo,
            task_repo,
            broker,
            controller,
            retry_policy,
            time_provider,
            config,
        }
    }

    /// Periodic loop; spawn this in the daemon alongside the executor(s).
    pub async fn run(self) {
        info!(interval_ms = self.config.interval_ms, "janitor started");
        let mut tick = interval(Duration::from_millis(self.config.interval_ms as u64));
        loop {
            tick.tick().await;
            match self.sweep_once().await {
                Ok(report) => info!(?report, "janitor sweep completed"),
                Err(e) => warn!(error = %e, "janitor sweep failed"),
            }
        }
    }

    /// Runs all sweeps once. Exposed separately from `run` so the daemon
    /// can trigger a pass at startup before the periodic loop begins.
    pub async fn sweep_once(&self) -> Result<JanitorReport> {
        let mut report = JanitorReport::default();
        self.sweep_deadlines(&mut report).await?;
        self.sweep_stale_heartbeats(&mut report).await?;
        self.sweep_ready_retries(&mut report).await?;
        self.sweep_orphaned_queued(&mut report).await?;
        self.sweep_stuck_jobs(&mut report).await?;
        self.sweep_stage_completion(&mut report).await?;
        Ok(report)
    }

    /// Requeue protocol (spec §4.6 `Retrying ──requeue──► PendingRetry`):
    /// a Retrying task whose backoff delay has elapsed is transitioned to
    /// PendingRetry and a TaskStart is republished so the executor's
    /// claim picks it back up. `requeue_retry`'s guard ensures only one
    /// sweep pass ever republishes a given task.
    async fn sweep_ready_retries(&self, report: &mut JanitorReport) -> Result<()> {
        let now = self.time_provider.now_millis();
        let ready = self.task_repo.find_ready_retries(now).await?;

        for task in ready {
            if !self.task_repo.requeue_retry(&task.task_id).await? {
                continue;
            }
            info!(task_id = %task.task_id, "requeuing task after backoff delay");
            self.broker
                .publish(
                    Queue::Tasks,
                    &BrokerMessage::TaskStart {
                        task_id: task.task_id.clone(),
                        job_id: task.parent_job_id.clone(),
                        task_type: task.task_type.clone(),
                        stage: task.stage,
                    },
                )
                .await?;
            report.ready_retries_requeued += 1;
        }
        Ok(())
    }

    /// Jobs past their deadline are failed outright; in-flight tasks are
    /// left recorded but can no longer advance a dead job (SPEC_FULL §4.3
    /// resolved Open Question).
    async fn sweep_deadlines(&self, report: &mut JanitorReport) -> Result<()> {
        let now = self.time_provider.now_millis();
        for job in self.job_repo.find_by_status(JobStatus::Processing).await? {
            if job.is_deadline_exceeded(now) {
                warn!(job_id = %job.job_id, "job deadline exceeded");
                self.job_repo
                    .mark_failed(&job.job_id, "job deadline exceeded")
                    .await?;
                report.deadlines_exceeded += 1;
            }
        }
        Ok(())
    }

    /// Stale heartbeats (spec §4.7): Processing tasks whose heartbeat is
    /// older than the timeout are re-queued up to the retry budget, else
    /// failed outright.
    async fn sweep_stale_heartbeats(&self, report: &mut JanitorReport) -> Result<()> {
        let now = self.time_provider.now_millis();
        let stale = self
            .task_repo
            .find_stale_heartbeats(self.config.heartbeat_timeout_ms, now)
            .await?;

        for task in stale {
            if task.retry_count < self.config.retry_budget {
                warn!(task_id = %task.task_id, "stale heartbeat, requeuing task");
                self.task_repo.schedule_retry(&task.task_id, now).await?;
                report.stale_heartbeats_requeued += 1;
            } else {
                warn!(task_id = %task.task_id, "stale heartbeat, retry budget exhausted, failing task");
                let outcome = self
                    .task_repo
                    .complete_and_check_stage(
                        &task.task_id,
                        &task.parent_job_id,
                        task.stage,
                        TaskResultStatus::Failed,
                        None,
                        Some("task heartbeat timed out and retry budget was exhausted"),
                        None,
                    )
                    .await?;
                if outcome.is_last {
                    self.publish_stage_done(&task.parent_job_id, task.stage).await?;
                }
                report.stale_heartbeats_failed += 1;
            }
        }
        Ok(())
    }

    /// Orphaned Queued tasks (spec §4.7): no discoverable broker message,
    /// or simply older than the threshold — republish a TaskStart.
    async fn sweep_orphaned_queued(&self, report: &mut JanitorReport) -> Result<()> {
        let now = self.time_provider.now_millis();
        let orphaned = self
            .task_repo
            .find_orphaned_queued(self.config.orphan_task_age_ms, now)
            .await?;

        for task in orphaned {
            warn!(task_id = %task.task_id, "republishing orphaned queued task");
            self.broker
                .publish(
                    Queue::Tasks,
                    &BrokerMessage::TaskStart {
                        task_id: task.task_id.clone(),
                        job_id: task.parent_job_id.clone(),
                        task_type: task.task_type.clone(),
                        stage: task.stage,
                    },
                )
                .await?;
            report.orphaned_tasks_republished += 1;
        }
        Ok(())
    }

    /// Stuck Queued jobs (spec §4.7): a JobStart message never arrived or
    /// was lost — republish it.
    async fn sweep_stuck_jobs(&self, report: &mut JanitorReport) -> Result<()> {
        let stuck = self
            .job_repo
            .find_stuck_queued(self.config.stuck_job_age_ms)
            .await?;

        for job in stuck {
            warn!(job_id = %job.job_id, "republishing stuck queued job");
            self.broker
                .publish(
                    Queue::Jobs,
                    &BrokerMessage::JobStart {
                        job_id: job.job_id.clone(),
                        job_type: job.job_type.clone(),
                    },
                )
                .await?;
            report.stuck_jobs_republished += 1;
        }
        Ok(())
    }

    /// Stage-completion sanity (spec §4.7): a Processing job whose
    /// current stage has zero non-terminal tasks, but no StageDone was
    /// ever observed (the last task's completion raced the crash of its
    /// own StageDone publish) — synthesize it via the same idempotent
    /// path a real delivery would take.
    async fn sweep_stage_completion(&self, report: &mut JanitorReport) -> Result<()> {
        for job in self.job_repo.find_by_status(JobStatus::Processing).await? {
            if self.retry_policy.is_job_deadline_exceeded(job.deadline) {
                continue;
            }
            let remaining = self
                .task_repo
                .count_non_terminal(&job.job_id, job.stage)
                .await?;
            if remaining == 0 {
                info!(job_id = %job.job_id, stage = job.stage, "synthesizing missed StageDone");
                self.controller.on_stage_done(&job.job_id, job.stage).await?;
                report.stage_completions_synthesized += 1;
            }
        }
        Ok(())
    }

    async fn publish_stage_done(&self, job_id: &str, stage: i32) -> Result<()> {
        self.broker
            .publish(
                Queue::StageDone,
                &BrokerMessage::StageDone {
                    job_id: job_id.to_string(),
                    stage,
                },
            )
            .await
    }
}
