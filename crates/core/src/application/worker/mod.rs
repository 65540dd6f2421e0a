// Executor - claims task messages and drives registered handlers
// (spec §4.6). Grounded on the teacher's worker run-loop shape (idle
// sleep, panic-isolated spawn, graceful shutdown token) generalized from
// "pop a job row" to "consume a Tasks queue message, claim the row,
// invoke its registered handler".

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::registry::TaskHandlerRegistry;
use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::domain::{Task, TaskId, TaskResultStatus};
use crate::error::Result;
use crate::port::{
    BrokerMessage, BrokerPort, HandlerContext, HandlerError, Queue, TaskHandler, TaskRepository,
    TimeProvider,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Consumes the Tasks queue, claims rows, and drives handlers (spec §4.6).
pub struct Executor {
    task_repo: Arc<dyn TaskRepository>,
    broker: Arc<dyn BrokerPort>,
    handlers: Arc<TaskHandlerRegistry>,
    retry_policy: Arc<RetryPolicy>,
    time_provider: Arc<dyn TimeProvider>,
}

impl Executor {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        broker: Arc<dyn BrokerPort>,
        handlers: Arc<TaskHandlerRegistry>,
        retry_policy: Arc<RetryPolicy>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            task_repo,
            broker,
            handlers,
            retry_policy,
            time_provider,
        }
    }

    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!("executor started");
        loop {
            if shutdown.is_shutdown() {
                info!("executor shutting down");
                break;
            }
            match self.process_next_task().await {
                Ok(processed) => {
                    if !processed {
                        tokio::select! {
                            _ = sleep(IDLE_SLEEP_DURATION) => {},
                            _ = shutdown.wait() => {
                                info!("executor interrupted during idle");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("executor error: {e}");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!("executor interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        info!("executor stopped");
        Ok(())
    }

    /// Consumes one message and drives it to completion. Returns `true`
    /// if a message was processed (whether successfully or not).
    pub async fn process_next_task(&self) -> Result<bool> {
        let delivery = match self.broker.consume(Queue::Tasks).await? {
            Some(d) => d,
            None => return Ok(false),
        };

        let (task_id, stage, parent_job_id) = match &delivery.message {
            BrokerMessage::TaskStart {
                task_id,
                job_id,
                stage,
                ..
            } => (task_id.clone(), *stage, job_id.clone()),
            other => {
                warn!(?other, "executor: unexpected message on tasks queue, acking and dropping");
                self.broker.ack(Queue::Tasks, &delivery.receipt).await?;
                return Ok(true);
            }
        };

        // Claim protocol (spec §4.6): WHERE status IN ('queued',
        // 'pending_retry'). A miss means a duplicate delivery already
        // claimed and possibly finished this task.
        let task = match self.task_repo.claim(&task_id).await? {
            Some(t) => t,
            None => {
                info!(task_id = %task_id, "executor: task already claimed, acking duplicate delivery");
                self.broker.ack(Queue::Tasks, &delivery.receipt).await?;
                return Ok(true);
            }
        };

        let handler = match self.handlers.get(&task.task_type) {
            Ok(h) => h,
            Err(e) => {
                error!(task_id = %task_id, task_type = %task.task_type, "executor: no handler registered");
                self.task_repo
                    .mark_failed(&task_id, &format!("no handler registered: {e}"))
                    .await?;
                self.broker.ack(Queue::Tasks, &delivery.receipt).await?;
                return Ok(true);
            }
        };

        let task_arc = Arc::new(task);
        let outcome = self.invoke_handler(Arc::clone(&task_arc), handler).await;

        self.apply_outcome(&task_arc, stage, &parent_job_id, outcome)
            .await?;

        self.broker.ack(Queue::Tasks, &delivery.receipt).await?;
        Ok(true)
    }

    /// Runs the handler under panic isolation (spec §9 "a handler panic
    /// must not take down the daemon").
    async fn invoke_handler(
        &self,
        task: Arc<Task>,
        handler: Arc<dyn TaskHandler>,
    ) -> std::result::Result<crate::domain::TaskOutcome, HandlerError> {
        let task_repo = Arc::clone(&self.task_repo);
        let task_id = task.task_id.clone();
        let heartbeat: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            let task_repo = Arc::clone(&task_repo);
            let task_id = task_id.clone();
            tokio::spawn(async move {
                if let Err(e) = task_repo.update_heartbeat(&task_id).await {
                    warn!(task_id = %task_id, error = %e, "heartbeat update failed");
                }
            });
        });
        let ctx = HandlerContext::new(heartbeat);

        let handle = tokio::task::spawn(async move { handler.handle(&task, &ctx).await });

        match handle.await {
            Ok(result) => result,
            Err(join_err) => {
                if join_err.is_panic() {
                    Err(HandlerError::Permanent(format!("handler panicked: {join_err}")))
                } else {
                    Err(HandlerError::Transient(format!("handler task cancelled: {join_err}")))
                }
            }
        }
    }

    async fn apply_outcome(
        &self,
        task: &Task,
        stage: i32,
        parent_job_id: &str,
        outcome: std::result::Result<crate::domain::TaskOutcome, HandlerError>,
    ) -> Result<()> {
        match outcome {
            Ok(task_outcome) => {
                let result = self
                    .task_repo
                    .complete_and_check_stage(
                        &task.task_id,
                        parent_job_id,
                        stage,
                        TaskResultStatus::Completed,
                        task_outcome.result_data.as_ref(),
                        None,
                        task_outcome.next_stage_params.as_ref(),
                    )
                    .await?;
                info!(task_id = %task.task_id, "task completed");
                if result.is_last {
                    self.publish_stage_done(parent_job_id, stage).await?;
                }
                Ok(())
            }
            Err(handler_error) => self.apply_failure(task, stage, parent_job_id, handler_error).await,
        }
    }

    async fn apply_failure(
        &self,
        task: &Task,
        stage: i32,
        parent_job_id: &str,
        error: HandlerError,
    ) -> Result<()> {
        match self.retry_policy.should_retry(task, &error) {
            RetryDecision::Retry(delay_ms) => {
                let ready_at = self.time_provider.now_millis() + delay_ms;
                info!(task_id = %task.task_id, delay_ms, "retrying task after transient failure");
                self.task_repo.schedule_retry(&task.task_id, ready_at).await?;
                self.spawn_delayed_requeue(task.task_id.clone(), task.parent_job_id.clone(), task.task_type.clone(), stage, delay_ms);
                Ok(())
            }
            RetryDecision::Failed => {
                let message = error.to_string();
                let result = self
                    .task_repo
                    .complete_and_check_stage(
                        &task.task_id,
                        parent_job_id,
                        stage,
                        TaskResultStatus::Failed,
                        None,
                        Some(&message),
                        None,
                    )
                    .await?;
                error!(task_id = %task.task_id, error = %message, "task failed");
                if result.is_last {
                    self.publish_stage_done(parent_job_id, stage).await?;
                }
                Ok(())
            }
        }
    }

    /// Primary path for the `Retrying ──requeue──► PendingRetry` step
    /// (spec §4.6): waits out the backoff delay in-process, then
    /// transitions the task and republishes its TaskStart. If the daemon
    /// dies before this fires, the task stays Retrying and the janitor's
    /// `sweep_ready_retries` requeues it instead — this is a latency
    /// optimization over that sweep, not a replacement for it.
    fn spawn_delayed_requeue(&self, task_id: TaskId, parent_job_id: String, task_type: String, stage: i32, delay_ms: i64) {
        let task_repo = Arc::clone(&self.task_repo);
        let broker = Arc::clone(&self.broker);
        tokio::spawn(async move {
            sleep(Duration::from_millis(delay_ms.max(0) as u64)).await;
            match task_repo.requeue_retry(&task_id).await {
                Ok(true) => {
                    if let Err(e) = broker
                        .publish(
                            Queue::Tasks,
                            &BrokerMessage::TaskStart {
                                task_id: task_id.clone(),
                                job_id: parent_job_id,
                                task_type,
                                stage,
                            },
                        )
                        .await
                    {
                        warn!(task_id = %task_id, error = %e, "failed to republish retried task");
                    }
                }
                Ok(false) => {
                    info!(task_id = %task_id, "retry already requeued by janitor, skipping");
                }
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "failed to requeue retried task");
                }
            }
        });
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
