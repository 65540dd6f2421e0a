//! End-to-end scenarios against a real Postgres store and pgmq broker,
//! driving the full submit -> dispatch -> execute -> advance -> finalize
//! life cycle through spawned Executor/Dispatcher loops.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{register_handler, single_stage_definition, wait_for_terminal, Harness};
use geostage_core::application::registry::{
    FieldSpec, FieldType, JobDefinition, JobRegistry, ParameterSchema,
};
use geostage_core::domain::{JobStatus, TaskOutcome, TaskPlan, TaskResultStatus, TaskStatus};
use geostage_core::port::preflight::mocks::{AlwaysFail, AlwaysPass};
use geostage_core::port::task_handler::{HandlerContext, HandlerError, TaskHandler};
use geostage_core::port::{IdProvider, JobRepository, TaskRepository};
use serde_json::json;

struct EchoHandler;

#[async_trait]
impl TaskHandler for EchoHandler {
    async fn handle(
        &self,
        task: &geostage_core::domain::Task,
        ctx: &HandlerContext,
    ) -> Result<TaskOutcome, HandlerError> {
        ctx.heartbeat();
        Ok(TaskOutcome {
            status: TaskResultStatus::Completed,
            result_data: Some(json!({ "task_index": task.task_index })),
            error_details: None,
            next_stage_params: None,
        })
    }
}

/// Stage-1 handler for the lineage scenario: hands a per-index
/// `temp_path` forward to the same-index stage-2 task.
struct LineageProducerHandler;

#[async_trait]
impl TaskHandler for LineageProducerHandler {
    async fn handle(
        &self,
        task: &geostage_core::domain::Task,
        ctx: &HandlerContext,
    ) -> Result<TaskOutcome, HandlerError> {
        ctx.heartbeat();
        Ok(TaskOutcome {
            status: TaskResultStatus::Completed,
            result_data: Some(json!({ "task_index": task.task_index })),
            error_details: None,
            next_stage_params: Some(json!({ "temp_path": format!("/tmp/tile-{}", task.task_index) })),
        })
    }
}

struct LineageConsumerHandler;

#[async_trait]
impl TaskHandler for LineageConsumerHandler {
    async fn handle(
        &self,
        task: &geostage_core::domain::Task,
        ctx: &HandlerContext,
    ) -> Result<TaskOutcome, HandlerError> {
        ctx.heartbeat();
        Ok(TaskOutcome {
            status: TaskResultStatus::Completed,
            result_data: Some(task.parameters.clone()),
            error_details: None,
            next_stage_params: None,
        })
    }
}

/// Fails on its first call with a transient error, then succeeds. Models
/// scenario 4 ("transient handler failure then success") — the static
/// `MockTaskHandler` in core can't express a call-count-dependent
/// transition, so each flaky test owns one of these.
struct FlakyHandler {
    calls: AtomicUsize,
}

impl FlakyHandler {
    fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for FlakyHandler {
    async fn handle(
        &self,
        task: &geostage_core::domain::Task,
        ctx: &HandlerContext,
    ) -> Result<TaskOutcome, HandlerError> {
        ctx.heartbeat();
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            return Err(HandlerError::Transient("storage temporarily unavailable".to_string()));
        }
        Ok(TaskOutcome {
            status: TaskResultStatus::Completed,
            result_data: Some(json!({ "task_index": task.task_index })),
            error_details: None,
            next_stage_params: None,
        })
    }
}

/// Fails permanently for one task_index, succeeds for the rest. Models
/// scenario 5 ("partial stage failure").
struct PartialFailureHandler {
    failing_index: i32,
}

#[async_trait]
impl TaskHandler for PartialFailureHandler {
    async fn handle(
        &self,
        task: &geostage_core::domain::Task,
        ctx: &HandlerContext,
    ) -> Result<TaskOutcome, HandlerError> {
        ctx.heartbeat();
        if task.task_index == self.failing_index {
            return Err(HandlerError::Permanent("blob checksum mismatch".to_string()));
        }
        Ok(TaskOutcome {
            status: TaskResultStatus::Completed,
            result_data: Some(json!({ "task_index": task.task_index })),
            error_details: None,
            next_stage_params: None,
        })
    }
}

#[tokio::test]
async fn scenario_1_happy_path_single_stage() {
    let mut registry = JobRegistry::new();
    registry.register(single_stage_definition("hello_world", "greet", 3));
    let handlers = register_handler("greet", Arc::new(EchoHandler));

    let Some(harness) = common::setup(registry, handlers).await else {
        eprintln!("GEOSTAGE_TEST_DATABASE_URL not set, skipping");
        return;
    };

    let outcome = harness
        .controller
        .submit("hello_world", json!({ "dataset_id": "n3" }), None)
        .await
        .expect("submit");
    assert!(!outcome.already_existed);

    let job = wait_for_terminal(&harness.job_repo, &outcome.job_id, Duration::from_secs(10)).await;
    assert_eq!(job.status, JobStatus::Completed);

    let stage_one = job.stage_results.get("1").expect("stage 1 results").as_array().unwrap();
    assert_eq!(stage_one.len(), 3);
    for entry in stage_one {
        assert_eq!(entry["status"], "COMPLETED");
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn scenario_2_two_stage_lineage() {
    let task_count = 4;
    let definition = JobDefinition {
        job_type: "lineage_job".to_string(),
        parameters_schema: ParameterSchema::new(vec![FieldSpec::required(
            "dataset_id",
            FieldType::String,
        )]),
        total_stages: 2,
        resource_validators: vec![Arc::new(AlwaysPass)],
        plan_stage: Arc::new(move |job, stage| {
            if stage == 1 {
                (0..task_count)
                    .map(|i| TaskPlan {
                        task_type: "produce_tile".to_string(),
                        task_index: i,
                        parameters: job.parameters.clone(),
                    })
                    .collect()
            } else {
                let prior = job.stage_results.get("1").and_then(|v| v.as_array()).cloned().unwrap_or_default();
                prior
                    .into_iter()
                    .map(|entry| {
                        let task_index = entry["task_index"].as_i64().unwrap() as i32;
                        let next_params = entry["next_stage_params"].clone();
                        TaskPlan {
                            task_type: "consume_tile".to_string(),
                            task_index,
                            parameters: next_params,
                        }
                    })
                    .collect()
            }
        }),
        finalize: Arc::new(|_job, stage_results| stage_results.clone()),
        sanitize_error: Arc::new(|raw| raw.to_string()),
    };

    let mut registry = JobRegistry::new();
    registry.register(definition);

    let mut handlers = geostage_core::application::registry::TaskHandlerRegistry::new();
    handlers.register("produce_tile", Arc::new(LineageProducerHandler));
    handlers.register("consume_tile", Arc::new(LineageConsumerHandler));

    let Some(harness) = common::setup(registry, handlers).await else {
        eprintln!("GEOSTAGE_TEST_DATABASE_URL not set, skipping");
        return;
    };

    let outcome = harness
        .controller
        .submit("lineage_job", json!({ "dataset_id": "tiles-4" }), None)
        .await
        .expect("submit");

    let job = wait_for_terminal(&harness.job_repo, &outcome.job_id, Duration::from_secs(10)).await;
    assert_eq!(job.status, JobStatus::Completed);

    for i in 0..task_count {
        let task = harness
            .task_repo
            .find_by_job_stage_index(&outcome.job_id, 2, i)
            .await
            .unwrap()
            .expect("stage 2 task");
        assert_eq!(
            task.parameters["temp_path"],
            json!(format!("/tmp/tile-{i}")),
            "stage 2 task {i} did not receive stage 1's lineage handoff"
        );
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn scenario_3_duplicate_submit_is_idempotent() {
    let mut registry = JobRegistry::new();
    registry.register(single_stage_definition("hello_world", "greet", 2));
    let handlers = register_handler("greet", Arc::new(EchoHandler));

    let Some(harness) = common::setup(registry, handlers).await else {
        eprintln!("GEOSTAGE_TEST_DATABASE_URL not set, skipping");
        return;
    };

    let params = json!({ "dataset_id": "dup-check" });
    let first = harness.controller.submit("hello_world", params.clone(), None).await.expect("first submit");
    let second = harness.controller.submit("hello_world", params, None).await.expect("second submit");

    assert_eq!(first.job_id, second.job_id);
    assert!(!first.already_existed);
    assert!(second.already_existed);

    let _ = wait_for_terminal(&harness.job_repo, &first.job_id, Duration::from_secs(10)).await;
    let tasks = harness.task_repo.find_by_job_and_stage(&first.job_id, 1).await.unwrap();
    assert_eq!(tasks.len(), 2, "duplicate submit must not seed a second set of tasks");

    harness.shutdown().await;
}

#[tokio::test]
async fn scenario_4_transient_failure_then_success() {
    let mut registry = JobRegistry::new();
    registry.register(single_stage_definition("hello_world", "flaky", 1));
    let handler = Arc::new(FlakyHandler::new());
    let handlers = register_handler("flaky", handler.clone());

    let Some(harness) = common::setup(registry, handlers).await else {
        eprintln!("GEOSTAGE_TEST_DATABASE_URL not set, skipping");
        return;
    };

    let outcome = harness
        .controller
        .submit("hello_world", json!({ "dataset_id": "flaky-1" }), None)
        .await
        .expect("submit");

    let job = wait_for_terminal(&harness.job_repo, &outcome.job_id, Duration::from_secs(10)).await;
    assert_eq!(job.status, JobStatus::Completed);

    let task = harness
        .task_repo
        .find_by_job_stage_index(&outcome.job_id, 1, 0)
        .await
        .unwrap()
        .expect("task");
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.retry_count, 1);
    assert_eq!(handler.call_count(), 2, "handler should run exactly twice: once failed, once succeeded");

    harness.shutdown().await;
}

#[tokio::test]
async fn scenario_5_partial_stage_failure_completes_with_errors() {
    let mut registry = JobRegistry::new();
    registry.register(single_stage_definition("hello_world", "partial", 5));
    let handlers = register_handler("partial", Arc::new(PartialFailureHandler { failing_index: 2 }));

    let Some(harness) = common::setup(registry, handlers).await else {
        eprintln!("GEOSTAGE_TEST_DATABASE_URL not set, skipping");
        return;
    };

    let outcome = harness
        .controller
        .submit("hello_world", json!({ "dataset_id": "partial-5" }), None)
        .await
        .expect("submit");

    let job = wait_for_terminal(&harness.job_repo, &outcome.job_id, Duration::from_secs(10)).await;
    assert_eq!(job.status, JobStatus::CompletedWithErrors);

    let failed_task = harness
        .task_repo
        .find_by_job_stage_index(&outcome.job_id, 1, 2)
        .await
        .unwrap()
        .expect("failing task");
    assert_eq!(failed_task.status, TaskStatus::Failed);
    assert!(failed_task.error_details.is_some());

    for i in [0, 1, 3, 4] {
        let ok_task = harness
            .task_repo
            .find_by_job_stage_index(&outcome.job_id, 1, i)
            .await
            .unwrap()
            .expect("succeeding task");
        assert_eq!(ok_task.status, TaskStatus::Completed);
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn scenario_6_duplicate_stage_done_delivery_advances_once() {
    use geostage_core::port::{BrokerMessage, BrokerPort, Queue};

    let mut registry = JobRegistry::new();
    registry.register(single_stage_definition("hello_world", "greet", 1));
    let handlers = register_handler("greet", Arc::new(EchoHandler));

    let Some(harness) = common::setup(registry, handlers).await else {
        eprintln!("GEOSTAGE_TEST_DATABASE_URL not set, skipping");
        return;
    };

    let outcome = harness
        .controller
        .submit("hello_world", json!({ "dataset_id": "dup-stage-done" }), None)
        .await
        .expect("submit");

    let job = wait_for_terminal(&harness.job_repo, &outcome.job_id, Duration::from_secs(10)).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.stage, 2);

    // Replay the StageDone message a further 3 times, simulating
    // at-least-once redelivery after the job already advanced.
    for _ in 0..3 {
        harness
            .broker
            .publish(
                Queue::StageDone,
                &BrokerMessage::StageDone { job_id: outcome.job_id.clone(), stage: 1 },
            )
            .await
            .expect("publish duplicate StageDone");
    }

    tokio::time::sleep(Duration::from_millis(500)).await;

    let job = harness.job_repo.find_by_id(&outcome.job_id).await.unwrap().unwrap();
    assert_eq!(job.stage, 2, "stage must not advance past its single real completion");
    assert_eq!(job.status, JobStatus::Completed);

    harness.shutdown().await;
}

#[tokio::test]
async fn scenario_7_preflight_rejection_has_no_side_effects() {
    let task_type = "unused";
    let definition = JobDefinition {
        job_type: "ingest_vector".to_string(),
        parameters_schema: ParameterSchema::new(vec![FieldSpec::required(
            "dataset_id",
            FieldType::String,
        )]),
        total_stages: 1,
        resource_validators: vec![Arc::new(AlwaysFail("source blob is missing".to_string()))],
        plan_stage: Arc::new(move |job, _stage| {
            vec![TaskPlan {
                task_type: task_type.to_string(),
                task_index: 0,
                parameters: job.parameters.clone(),
            }]
        }),
        finalize: Arc::new(|_job, stage_results| stage_results.clone()),
        sanitize_error: Arc::new(|raw| raw.to_string()),
    };

    let mut registry = JobRegistry::new();
    registry.register(definition);
    let handlers = geostage_core::application::registry::TaskHandlerRegistry::new();

    let Some(harness) = common::setup(registry, handlers).await else {
        eprintln!("GEOSTAGE_TEST_DATABASE_URL not set, skipping");
        return;
    };

    let params = json!({ "dataset_id": "missing-blob" });
    let job_id = geostage_core::port::Sha256IdProvider.derive_job_id("ingest_vector", &params);

    let result = harness.controller.submit("ingest_vector", params, None).await;
    assert!(result.is_err(), "pre-flight rejection must surface as an error");

    let row = harness.job_repo.find_by_id(&job_id).await.unwrap();
    assert!(row.is_none(), "rejected submission must not leave a jobs row behind");

    harness.shutdown().await;
}
