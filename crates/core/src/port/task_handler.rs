// Task handler port (spec §4.6 "Handler contract")
//
// The core treats concrete task handlers as an external registry of
// `(task_type → handler)` functions (spec §1 Out of scope). This port is
// the seam the executor calls through; it never knows what a handler
// actually does.

use crate::domain::{Task, TaskOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Three-way classification the executor's retry policy acts on (spec §4.6
/// "Retry classification").
#[derive(Error, Debug, Clone)]
pub enum HandlerError {
    #[error("transient error: {0}")]
    Transient(String),

    #[error("permanent error: {0}")]
    Permanent(String),

    #[error("throttled: {0}")]
    Throttling(String),
}

/// Supplied to every handler invocation so long-running handlers update
/// `tasks.heartbeat` without constructing their own repository connection
/// (spec §9 "Heartbeat discipline").
#[derive(Clone)]
pub struct HandlerContext {
    heartbeat: Arc<dyn Fn() + Send + Sync>,
}

impl HandlerContext {
    pub fn new(heartbeat: Arc<dyn Fn() + Send + Sync>) -> Self {
        Self { heartbeat }
    }

    pub fn heartbeat(&self) {
        (self.heartbeat)();
    }
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task, ctx: &HandlerContext) -> Result<TaskOutcome, HandlerError>;
}

pub mod mocks {
    use super::*;
    use crate::domain::TaskResultStatus;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        Success,
        Fail(HandlerError),
        Panic(String),
    }

    pub struct MockTaskHandler {
        behavior: Mutex<MockBehavior>,
        call_count: Mutex<usize>,
    }

    impl MockTaskHandler {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Mutex::new(behavior),
                call_count: Mutex::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl TaskHandler for MockTaskHandler {
        async fn handle(
            &self,
            _task: &Task,
            ctx: &HandlerContext,
        ) -> Result<TaskOutcome, HandlerError> {
            *self.call_count.lock().unwrap() += 1;
            ctx.heartbeat();

            match self.behavior.lock().unwrap().clone() {
                MockBehavior::Success => Ok(TaskOutcome {
                    status: TaskResultStatus::Completed,
                    result_data: Some(serde_json::json!({"ok": true})),
                    error_details: None,
                    next_stage_params: None,
                }),
                MockBehavior::Fail(e) => Err(e),
                MockBehavior::Panic(msg) => panic!("{}", msg),
            }
        }
    }
}
