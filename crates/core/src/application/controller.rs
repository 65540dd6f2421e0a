// Job controller (spec §4.3): submission, stage advancement, finalization.
//
// Grounded on the teacher's application-layer use-case pattern of wrapping
// a handful of repository/port traits behind one service struct (compare
// the deleted dev_task/enqueue.rs), generalized from "enqueue one job" to
// the full submit/on_job_start/on_stage_done/finalize life cycle.

use crate::application::registry::JobRegistry;
use crate::domain::{ApiRequest, Job, JobId, JobStatus, Task, TaskResultStatus};
use crate::error::{AppError, Result};
use crate::port::{
    ApiRequestRepository, BrokerMessage, BrokerPort, IdProvider, JobRepository, Queue,
    TaskRepository, TimeProvider,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of [`Controller::submit`] (spec §4.3).
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub job_id: JobId,
    pub already_existed: bool,
}

/// Caller-supplied identifiers for the spec §3 "API request (thin)"
/// idempotency record. Distinct from job-id dedup (keyed by
/// `job_type` + canonical parameters): this lets a caller resubmit
/// under the same external identifiers and resolve to the same job
/// even if the parameters they passed happen to differ cosmetically.
#[derive(Debug, Clone)]
pub struct ApiRequestKey {
    pub dataset_id: String,
    pub resource_id: String,
    pub version_id: String,
    pub data_type: String,
}

pub struct Controller {
    job_repo: Arc<dyn JobRepository>,
    task_repo: Arc<dyn TaskRepository>,
    api_request_repo: Arc<dyn ApiRequestRepository>,
    broker: Arc<dyn BrokerPort>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    registry: Arc<JobRegistry>,
}

impl Controller {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        task_repo: Arc<dyn TaskRepository>,
        api_request_repo: Arc<dyn ApiRequestRepository>,
        broker: Arc<dyn BrokerPort>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        registry: Arc<JobRegistry>,
    ) -> Self {
        Self {
            job_repo,
            task_repo,
            api_request_repo,
            broker,
            id_provider,
            time_provider,
            registry,
        }
    }

    /// Submit surface (spec §4.3): lookup registry -> validate schema ->
    /// run pre-flight validators -> compute job_id -> insert-if-absent ->
    /// publish JobStart. Duplicate submission is not an error: the
    /// existing job_id is returned with `already_existed: true` (spec §7
    /// "DuplicateJob: not an error").
    ///
    /// When `api_request` is supplied, the external identifiers it
    /// carries are checked against the "API request (thin)" idempotency
    /// table (spec §3) before anything else: a prior request under the
    /// same `(dataset_id, resource_id, version_id)` short-circuits
    /// straight to the job it already produced.
    pub async fn submit(
        &self,
        job_type: &str,
        mut parameters: serde_json::Value,
        api_request: Option<ApiRequestKey>,
    ) -> Result<SubmitOutcome> {
        let request_id = api_request
            .as_ref()
            .map(|key| self.id_provider.derive_request_id(&key.dataset_id, &key.resource_id, &key.version_id));

        if let Some(request_id) = &request_id {
            if let Some(existing) = self.api_request_repo.find_by_request_id(request_id).await? {
                info!(request_id = %request_id, job_id = %existing.job_id, "submit: resolved via API request idempotency record");
                return Ok(SubmitOutcome {
                    job_id: existing.job_id,
                    already_existed: true,
                });
            }
        }

        let definition = self.registry.get(job_type)?;

        definition.parameters_schema.apply_defaults(&mut parameters);
        let issues = definition.parameters_schema.validate(&parameters);
        if !issues.is_empty() {
            return Err(AppError::Validation(issues));
        }

        for validator in &definition.resource_validators {
            validator
                .validate(&parameters)
                .await
                .map_err(AppError::Preflight)?;
        }

        let job_id = self.id_provider.derive_job_id(job_type, &parameters);
        let now = self.time_provider.now_millis();

        let deadline = parameters
            .get("timeout_ms")
            .and_then(|v| v.as_i64())
            .map(|ms| now + ms);

        let job = Job::new(
            job_id.clone(),
            job_type,
            parameters,
            definition.total_stages,
            deadline,
            now,
        );

        let inserted = self.job_repo.insert_if_absent(&job).await?;
        if !inserted {
            info!(job_id = %job_id, "submit: job already exists, returning existing id");
            self.record_api_request(&api_request, request_id.as_deref(), &job_id, now).await?;
            return Ok(SubmitOutcome {
                job_id,
                already_existed: true,
            });
        }

        self.broker
            .publish(
                Queue::Jobs,
                &BrokerMessage::JobStart {
                    job_id: job_id.clone(),
                    job_type: job_type.to_string(),
                },
            )
            .await?;

        info!(job_id = %job_id, job_type, "submit: job created and JobStart published");
        self.record_api_request(&api_request, request_id.as_deref(), &job_id, now).await?;

        Ok(SubmitOutcome {
            job_id,
            already_existed: false,
        })
    }

    /// Persists the `(request_id -> job_id)` idempotency mapping once a
    /// job_id is known, if the caller supplied external identifiers.
    async fn record_api_request(
        &self,
        api_request: &Option<ApiRequestKey>,
        request_id: Option<&str>,
        job_id: &str,
        now: i64,
    ) -> Result<()> {
        if let (Some(key), Some(request_id)) = (api_request, request_id) {
            let record = ApiRequest::new(request_id, job_id, key.data_type.clone(), now);
            self.api_request_repo.insert_if_absent(&record).await?;
        }
        Ok(())
    }

    /// Handles a delivered JobStart message (spec §4.3): idempotent
    /// Queued -> Processing transition, then seeds stage 1.
    pub async fn on_job_start(&self, job_id: &JobId) -> Result<()> {
        let transitioned = self.job_repo.transition_to_processing(job_id).await?;
        if !transitioned {
            info!(job_id = %job_id, "on_job_start: already processing, ignoring duplicate delivery");
            return Ok(());
        }

        let job = self
            .job_repo
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;

        self.seed_stage(&job, 1).await
    }

    /// Handles a delivered StageDone message (spec §4.3, §4.5): assembles
    /// the stage's result summary from its task rows, advances the job's
    /// stage via the atomic stored routine, then either seeds the next
    /// stage or finalizes the job. At-least-once delivery of duplicate
    /// StageDone messages is neutralized by the guarded UPDATE inside
    /// `advance_stage` (spec §8 P2).
    pub async fn on_stage_done(&self, job_id: &JobId, stage: i32) -> Result<()> {
        let tasks = self.task_repo.find_by_job_and_stage(job_id, stage).await?;
        let stage_result = serde_json::Value::Array(
            tasks
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "task_id": t.task_id,
                        "task_index": t.task_index,
                        "status": t.status.to_string(),
                        "result_data": t.result_data,
                        "error_details": t.error_details,
                        "next_stage_params": t.next_stage_params,
                    })
                })
                .collect(),
        );

        let outcome = self
            .job_repo
            .advance_stage(job_id, stage, &stage_result)
            .await?;

        if !outcome.updated {
            info!(job_id = %job_id, stage, "on_stage_done: duplicate delivery, stage already advanced");
            return Ok(());
        }

        let job = self
            .job_repo
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;

        if outcome.is_final {
            self.finalize(job_id).await
        } else {
            self.seed_stage(&job, outcome.new_stage).await
        }
    }

    /// Internal finalize step (spec §4.3): runs the registered finalize
    /// function and marks the job Completed or CompletedWithErrors
    /// depending on whether any task anywhere in the job ever failed.
    pub async fn finalize(&self, job_id: &JobId) -> Result<()> {
        let job = self
            .job_repo
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;

        let definition = self.registry.get(&job.job_type)?;
        let result_data = definition.finalize(&job, &job.stage_results);

        let has_failures = job
            .stage_results
            .as_object()
            .map(|stages| {
                stages.values().any(|stage_value| {
                    stage_value
                        .as_array()
                        .map(|tasks| {
                            tasks.iter().any(|t| {
                                t.get("status").and_then(|s| s.as_str()) == Some("FAILED")
                            })
                        })
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false);

        let status = if has_failures {
            JobStatus::CompletedWithErrors
        } else {
            JobStatus::Completed
        };

        let updated = self.job_repo.finalize(job_id, &result_data, status).await?;
        if !updated {
            info!(job_id = %job_id, %status, "finalize: job already reached a terminal state, ignoring");
            return Ok(());
        }

        info!(job_id = %job_id, %status, "finalize: job reached terminal state");
        Ok(())
    }

    /// Stage seeding and pre-flight gate (spec §4.4): calls the
    /// registered `plan_stage`, fails the job if it returns no tasks,
    /// otherwise batch-inserts the stage's task rows and publishes one
    /// TaskStart per task.
    async fn seed_stage(&self, job: &Job, stage: i32) -> Result<()> {
        let definition = self.registry.get(&job.job_type)?;
        let plans = definition.plan_stage(job, stage);

        if plans.is_empty() {
            warn!(job_id = %job.job_id, stage, "seed_stage: plan_stage produced no tasks");
            self.job_repo
                .mark_failed(
                    &job.job_id,
                    &format!("no tasks produced for stage {stage}"),
                )
                .await?;
            return Ok(());
        }

        let now = self.time_provider.now_millis();
        let mut tasks = Vec::with_capacity(plans.len());
        for plan in &plans {
            let task_id = self
                .id_provider
                .derive_task_id(&job.job_id, stage, plan.task_index);
            tasks.push(Task::new(
                task_id,
                job.job_id.clone(),
                job.job_type.clone(),
                plan.task_type.clone(),
                stage,
                plan.task_index,
                plan.parameters.clone(),
                now,
            ));
        }

        self.task_repo.seed_stage(&tasks).await?;

        for task in &tasks {
            self.broker
                .publish(
                    Queue::Tasks,
                    &BrokerMessage::TaskStart {
                        task_id: task.task_id.clone(),
                        job_id: job.job_id.clone(),
                        task_type: task.task_type.clone(),
                        stage,
                    },
                )
                .await?;
        }

        info!(job_id = %job.job_id, stage, task_count = tasks.len(), "seed_stage: tasks seeded and published");
        Ok(())
    }
}

/// Used by the executor to decide whether completing a task should also
/// advance the stage (spec §4.5): every task completion, regardless of
/// Completed/Failed outcome, counts toward `is_last`. A stage still
/// advances even if some of its tasks failed (spec §7 "partial stage
/// failure is not fatal").
pub fn task_counts_toward_stage_completion(status: TaskResultStatus) -> bool {
    matches!(status, TaskResultStatus::Completed | TaskResultStatus::Failed)
}
