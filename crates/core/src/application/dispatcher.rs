// Control-plane dispatcher: consumes the Jobs and StageDone queues and
// drives them through the controller (spec §4.3). Separate from the
// executor because task handlers and control-plane transitions are
// independent event loops with no shared in-memory state (spec §5).

use crate::application::controller::Controller;
use crate::error::Result;
use crate::port::{BrokerMessage, BrokerPort, Queue};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::application::worker::{constants::*, ShutdownToken};

pub struct Dispatcher {
    broker: Arc<dyn BrokerPort>,
    controller: Arc<Controller>,
    queue: Queue,
}

impl Dispatcher {
    /// `queue` must be [`Queue::Jobs`] or [`Queue::StageDone`] — the
    /// dispatcher has no business consuming Tasks (that's the
    /// [`crate::application::worker::Executor`]'s job).
    pub fn new(broker: Arc<dyn BrokerPort>, controller: Arc<Controller>, queue: Queue) -> Self {
        Self {
            broker,
            controller,
            queue,
        }
    }

    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(queue = self.queue.name(), "dispatcher started");
        loop {
            if shutdown.is_shutdown() {
                info!(queue = self.queue.name(), "dispatcher shutting down");
                break;
            }
            match self.process_next().await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        _ = sleep(IDLE_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => break,
                    }
                }
                Err(e) => {
                    error!(queue = self.queue.name(), error = %e, "dispatcher error");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => break,
                    }
                }
            }
        }
        info!(queue = self.queue.name(), "dispatcher stopped");
        Ok(())
    }

    async fn process_next(&self) -> Result<bool> {
        let delivery = match self.broker.consume(self.queue).await? {
            Some(d) => d,
            None => return Ok(false),
        };

        match &delivery.message {
            BrokerMessage::JobStart { job_id, .. } => {
                self.controller.on_job_start(job_id).await?;
            }
            BrokerMessage::StageDone { job_id, stage } => {
                self.controller.on_stage_done(job_id, *stage).await?;
            }
            other => {
                warn!(?other, "dispatcher: unexpected message type, dropping");
            }
        }

        self.broker.ack(self.queue, &delivery.receipt).await?;
        Ok(true)
    }
}
