// pgmq-backed BrokerPort implementation (spec §6 "Broker contract").
//
// Each logical queue maps to one pgmq queue plus a sibling `_dlq` queue.
// pgmq has no built-in dead-letter semantics, so a delivery whose
// `read_ct` exceeds `MAX_DELIVERY_ATTEMPTS` is moved onto the DLQ queue
// by this adapter instead of being handed back to the caller.

use async_trait::async_trait;
use geostage_core::error::{AppError, Result};
use geostage_core::port::{BrokerMessage, BrokerPort, Delivery, Queue};
use pgmq::{Message, PGMQueueExt};

const DEFAULT_VISIBILITY_TIMEOUT_SECS: i32 = 60;
const MAX_DELIVERY_ATTEMPTS: i32 = 10;

fn dlq_name(queue: Queue) -> String {
    format!("{}_dlq", queue.name())
}

fn map_pgmq_error(err: impl std::fmt::Display) -> AppError {
    AppError::Broker(err.to_string())
}

pub struct PgmqBroker {
    queue: PGMQueueExt,
}

impl PgmqBroker {
    pub async fn new(database_url: &str) -> Result<Self> {
        let queue = PGMQueueExt::new(database_url.to_string(), 5)
            .await
            .map_err(map_pgmq_error)?;
        queue.init().await.map_err(map_pgmq_error)?;

        let broker = Self { queue };
        for q in [Queue::Jobs, Queue::Tasks, Queue::StageDone] {
            broker.queue.create(q.name()).await.map_err(map_pgmq_error)?;
            broker
                .queue
                .create(&dlq_name(q))
                .await
                .map_err(map_pgmq_error)?;
        }

        Ok(broker)
    }

    async fn move_to_dlq(&self, queue: Queue, msg: &Message<BrokerMessage>) -> Result<()> {
        self.queue
            .send(&dlq_name(queue), &msg.message)
            .await
            .map_err(map_pgmq_error)?;
        self.queue
            .archive(queue.name(), msg.msg_id)
            .await
            .map_err(map_pgmq_error)?;
        Ok(())
    }
}

#[async_trait]
impl BrokerPort for PgmqBroker {
    async fn publish(&self, queue: Queue, message: &BrokerMessage) -> Result<()> {
        self.queue
            .send(queue.name(), message)
            .await
            .map_err(map_pgmq_error)?;
        Ok(())
    }

    async fn consume(&self, queue: Queue) -> Result<Option<Delivery>> {
        loop {
            let read: Option<Message<BrokerMessage>> = self
                .queue
                .read(queue.name(), DEFAULT_VISIBILITY_TIMEOUT_SECS)
                .await
                .map_err(map_pgmq_error)?;

            let Some(msg) = read else {
                return Ok(None);
            };

            if msg.read_ct > MAX_DELIVERY_ATTEMPTS {
                self.move_to_dlq(queue, &msg).await?;
                continue;
            }

            return Ok(Some(Delivery {
                receipt: msg.msg_id.to_string(),
                message: msg.message,
            }));
        }
    }

    async fn ack(&self, queue: Queue, receipt: &str) -> Result<()> {
        let msg_id: i64 = receipt
            .parse()
            .map_err(|_| AppError::Broker(format!("invalid receipt: {receipt}")))?;
        self.queue
            .archive(queue.name(), msg_id)
            .await
            .map_err(map_pgmq_error)?;
        Ok(())
    }

    async fn extend_visibility(&self, queue: Queue, receipt: &str, extra_ms: i64) -> Result<()> {
        let msg_id: i64 = receipt
            .parse()
            .map_err(|_| AppError::Broker(format!("invalid receipt: {receipt}")))?;
        let extra_secs = (extra_ms / 1000).max(1) as i32;
        self.queue
            .set_vt::<BrokerMessage>(queue.name(), msg_id, extra_secs)
            .await
            .map_err(map_pgmq_error)?;
        Ok(())
    }

    async fn republish_dlq(&self, queue: Queue, limit: i64) -> Result<i64> {
        let mut moved = 0i64;
        while moved < limit {
            let read: Option<Message<BrokerMessage>> = self
                .queue
                .read(&dlq_name(queue), DEFAULT_VISIBILITY_TIMEOUT_SECS)
                .await
                .map_err(map_pgmq_error)?;

            let Some(msg) = read else {
                break;
            };

            self.queue
                .send(queue.name(), &msg.message)
                .await
                .map_err(map_pgmq_error)?;
            self.queue
                .archive(&dlq_name(queue), msg.msg_id)
                .await
                .map_err(map_pgmq_error)?;
            moved += 1;
        }
        Ok(moved)
    }

    async fn purge(&self, queue: Queue) -> Result<i64> {
        let mut removed = 0i64;
        for name in [queue.name().to_string(), dlq_name(queue)] {
            loop {
                let read: Option<Message<BrokerMessage>> = self
                    .queue
                    .read(&name, DEFAULT_VISIBILITY_TIMEOUT_SECS)
                    .await
                    .map_err(map_pgmq_error)?;

                let Some(msg) = read else {
                    break;
                };

                self.queue
                    .archive(&name, msg.msg_id)
                    .await
                    .map_err(map_pgmq_error)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
