// Broker adapter port (spec §6 "Broker contract")
//
// Three logical queues, each with a dead-letter sibling, at-least-once
// delivery. The message envelope carries only identifiers — large
// parameters are loaded from the store by id.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queue {
    Jobs,
    Tasks,
    StageDone,
}

impl Queue {
    pub fn name(self) -> &'static str {
        match self {
            Queue::Jobs => "jobs",
            Queue::Tasks => "tasks",
            Queue::StageDone => "stage_done",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BrokerMessage {
    JobStart { job_id: String, job_type: String },
    TaskStart {
        task_id: String,
        job_id: String,
        task_type: String,
        stage: i32,
    },
    StageDone { job_id: String, stage: i32 },
}

/// A delivered message plus the broker-specific receipt needed to ack,
/// extend, or let it fall back to redelivery.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub receipt: String,
    pub message: BrokerMessage,
}

#[async_trait]
pub trait BrokerPort: Send + Sync {
    async fn publish(&self, queue: Queue, message: &BrokerMessage) -> Result<()>;

    /// Non-blocking poll for a single message. Returns `None` if the queue
    /// is currently empty.
    async fn consume(&self, queue: Queue) -> Result<Option<Delivery>>;

    async fn ack(&self, queue: Queue, receipt: &str) -> Result<()>;

    /// Extends the visibility/lock duration of an in-flight delivery so a
    /// long-running handler isn't redelivered out from under itself.
    async fn extend_visibility(&self, queue: Queue, receipt: &str, extra_ms: i64) -> Result<()>;

    /// Moves up to `limit` dead-lettered messages back onto the live queue.
    async fn republish_dlq(&self, queue: Queue, limit: i64) -> Result<i64>;

    /// Administrative purge of a queue (and its DLQ). Returns count removed.
    async fn purge(&self, queue: Queue) -> Result<i64>;
}
