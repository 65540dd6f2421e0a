//! Property-style checks from spec §8 that aren't naturally covered by a
//! single end-to-end scenario: idempotent submission, monotone stage
//! advancement, terminal stickiness, and delete cascade integrity.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{register_handler, single_stage_definition, wait_for_terminal};
use geostage_core::domain::{JobStatus, Task, TaskOutcome, TaskResultStatus};
use geostage_core::port::task_handler::{HandlerContext, HandlerError, TaskHandler};
use geostage_core::port::{JobRepository, TaskRepository};
use serde_json::json;

struct EchoHandler;

#[async_trait]
impl TaskHandler for EchoHandler {
    async fn handle(&self, task: &Task, ctx: &HandlerContext) -> Result<TaskOutcome, HandlerError> {
        ctx.heartbeat();
        Ok(TaskOutcome {
            status: TaskResultStatus::Completed,
            result_data: Some(json!({ "task_index": task.task_index })),
            error_details: None,
            next_stage_params: None,
        })
    }
}

#[tokio::test]
async fn p1_concurrent_duplicate_submits_yield_one_job() {
    let mut registry = geostage_core::application::registry::JobRegistry::new();
    registry.register(single_stage_definition("hello_world", "greet", 1));
    let handlers = register_handler("greet", Arc::new(EchoHandler));

    let Some(harness) = common::setup(registry, handlers).await else {
        eprintln!("GEOSTAGE_TEST_DATABASE_URL not set, skipping");
        return;
    };

    let params = json!({ "dataset_id": "p1-concurrent" });
    let mut handles = Vec::new();
    for _ in 0..10 {
        let controller = harness.controller.clone();
        let params = params.clone();
        handles.push(tokio::spawn(async move {
            controller.submit("hello_world", params, None).await.expect("submit")
        }));
    }

    let mut job_ids = Vec::new();
    let mut fresh_inserts = 0;
    for handle in handles {
        let outcome = handle.await.expect("join");
        job_ids.push(outcome.job_id);
        if !outcome.already_existed {
            fresh_inserts += 1;
        }
    }

    assert!(job_ids.windows(2).all(|w| w[0] == w[1]), "all 10 submits must resolve to the same job_id");
    assert_eq!(fresh_inserts, 1, "exactly one submit may have actually inserted the row");

    let _ = wait_for_terminal(&harness.job_repo, &job_ids[0], Duration::from_secs(10)).await;
    let tasks = harness.task_repo.find_by_job_and_stage(&job_ids[0], 1).await.unwrap();
    assert_eq!(tasks.len(), 1, "ten duplicate submits must still seed exactly one task");

    harness.shutdown().await;
}

#[tokio::test]
async fn p4_job_stage_never_decreases() {
    let mut registry = geostage_core::application::registry::JobRegistry::new();
    registry.register(common::single_stage_definition("hello_world", "greet", 3));
    let handlers = register_handler("greet", Arc::new(EchoHandler));

    let Some(harness) = common::setup(registry, handlers).await else {
        eprintln!("GEOSTAGE_TEST_DATABASE_URL not set, skipping");
        return;
    };

    let outcome = harness
        .controller
        .submit("hello_world", json!({ "dataset_id": "p4-monotone" }), None)
        .await
        .expect("submit");

    let mut observed = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let job = harness.job_repo.find_by_id(&outcome.job_id).await.unwrap().unwrap();
        observed.push(job.stage);
        if job.status.is_terminal() {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("job did not reach a terminal state in time");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(observed.windows(2).all(|w| w[0] <= w[1]), "job.stage must never decrease: {observed:?}");

    harness.shutdown().await;
}

#[tokio::test]
async fn p5_terminal_job_ignores_further_stage_done_deliveries() {
    let mut registry = geostage_core::application::registry::JobRegistry::new();
    registry.register(common::single_stage_definition("hello_world", "greet", 1));
    let handlers = register_handler("greet", Arc::new(EchoHandler));

    let Some(harness) = common::setup(registry, handlers).await else {
        eprintln!("GEOSTAGE_TEST_DATABASE_URL not set, skipping");
        return;
    };

    let outcome = harness
        .controller
        .submit("hello_world", json!({ "dataset_id": "p5-sticky" }), None)
        .await
        .expect("submit");

    let job = wait_for_terminal(&harness.job_repo, &outcome.job_id, Duration::from_secs(10)).await;
    assert_eq!(job.status, JobStatus::Completed);

    // Re-deliver on_job_start and on_stage_done directly against a job
    // that has already reached a terminal state.
    harness.controller.on_job_start(&outcome.job_id).await.expect("on_job_start replay");
    harness.controller.on_stage_done(&outcome.job_id, 1).await.expect("on_stage_done replay");

    let after = harness.job_repo.find_by_id(&outcome.job_id).await.unwrap().unwrap();
    assert_eq!(after.status, JobStatus::Completed);
    assert_eq!(after.stage, job.stage);
    assert_eq!(after.updated_at, job.updated_at, "a terminal job must not be touched by replayed messages");

    harness.shutdown().await;
}

#[tokio::test]
async fn p6_deleting_a_job_cascades_to_its_tasks() {
    let mut registry = geostage_core::application::registry::JobRegistry::new();
    registry.register(common::single_stage_definition("hello_world", "greet", 4));
    let handlers = register_handler("greet", Arc::new(EchoHandler));

    let Some(harness) = common::setup(registry, handlers).await else {
        eprintln!("GEOSTAGE_TEST_DATABASE_URL not set, skipping");
        return;
    };

    let outcome = harness
        .controller
        .submit("hello_world", json!({ "dataset_id": "p6-cascade" }), None)
        .await
        .expect("submit");

    let _ = wait_for_terminal(&harness.job_repo, &outcome.job_id, Duration::from_secs(10)).await;

    let before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE parent_job_id = $1")
        .bind(&outcome.job_id)
        .fetch_one(&harness.pool)
        .await
        .unwrap();
    assert!(before > 0);

    sqlx::query("DELETE FROM jobs WHERE job_id = $1")
        .bind(&outcome.job_id)
        .execute(&harness.pool)
        .await
        .unwrap();

    let after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE parent_job_id = $1")
        .bind(&outcome.job_id)
        .fetch_one(&harness.pool)
        .await
        .unwrap();
    assert_eq!(after, 0, "deleting a job must cascade-delete all of its tasks");

    harness.shutdown().await;
}
