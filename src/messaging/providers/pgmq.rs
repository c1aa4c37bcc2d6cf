//! # PGMQ Task Queue
//!
//! Durable ingestion queue on PostgreSQL via the `pgmq` crate. Leases map to pgmq's
//! visibility timeout and the receive count to `read_ct`. The archive table
//! (`pgmq.a_<queue>`) is the dead-letter path: a message read more than
//! `max_receive_count` times is archived on the next read instead of being delivered.

use std::time::Duration;

use async_trait::async_trait;
use pgmq::{types::Message, PGMQueue};
use serde_json::Value;
use sqlx::{PgPool, Row};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::messaging::errors::{MessagingError, MessagingResult};
use crate::messaging::traits::TaskQueue;
use crate::messaging::types::{MessageId, QueueStats, QueuedMessage, ReceiptHandle};

#[derive(Debug, Clone)]
pub struct PgmqTaskQueue {
    pgmq: PGMQueue,
    pool: PgPool,
    max_receive_count: u32,
    poll_interval: Duration,
}

impl PgmqTaskQueue {
    /// Create a queue client over an existing pool
    pub async fn new_with_pool(pool: PgPool, max_receive_count: u32, poll_interval: Duration) -> Self {
        info!(max_receive_count, "Creating pgmq task queue with shared connection pool");
        let pgmq = PGMQueue::new_with_pool(pool.clone()).await;
        Self {
            pgmq,
            pool,
            max_receive_count,
            poll_interval,
        }
    }

    /// Queue names are interpolated into table names; only `[a-z0-9_]` is allowed
    pub fn validate_queue_name(queue_name: &str) -> MessagingResult<()> {
        if queue_name.is_empty() || queue_name.len() > 47 {
            return Err(MessagingError::invalid_queue_name(
                queue_name,
                "length must be between 1 and 47",
            ));
        }
        if !queue_name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(MessagingError::invalid_queue_name(
                queue_name,
                "only lowercase letters, digits and underscores are allowed",
            ));
        }
        Ok(())
    }

    fn msg_id(receipt_handle: &ReceiptHandle) -> MessagingResult<i64> {
        receipt_handle
            .as_i64()
            .ok_or_else(|| MessagingError::invalid_receipt_handle(receipt_handle.as_str()))
    }

    async fn read_once(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> MessagingResult<Vec<QueuedMessage<Value>>> {
        let vt = i32::try_from(visibility_timeout.as_secs().max(1)).unwrap_or(i32::MAX);
        let limit = i32::try_from(max_messages.max(1)).unwrap_or(i32::MAX);

        let messages: Vec<Message<Value>> = self
            .pgmq
            .read_batch(queue_name, Some(vt), limit)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "read", e.to_string()))?
            .unwrap_or_default();

        let mut leased = Vec::with_capacity(messages.len());
        for msg in messages {
            let read_ct = u32::try_from(msg.read_ct).unwrap_or(0);
            if read_ct > self.max_receive_count {
                warn!(
                    queue = %queue_name,
                    msg_id = msg.msg_id,
                    read_ct,
                    "Receive count exceeded; archiving to dead-letter table"
                );
                self.pgmq.archive(queue_name, msg.msg_id).await.map_err(|e| {
                    MessagingError::queue_operation(queue_name, "archive", e.to_string())
                })?;
                continue;
            }
            leased.push(QueuedMessage::new(
                ReceiptHandle::from(msg.msg_id),
                msg.message,
                read_ct,
                msg.enqueued_at,
            ));
        }
        Ok(leased)
    }
}

#[async_trait]
impl TaskQueue for PgmqTaskQueue {
    async fn ensure_queue(&self, queue_name: &str) -> MessagingResult<()> {
        Self::validate_queue_name(queue_name)?;
        self.pgmq
            .create(queue_name)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "create", e.to_string()))?;
        debug!(queue = %queue_name, "Queue ensured");
        Ok(())
    }

    async fn send_message(&self, queue_name: &str, body: &Value) -> MessagingResult<MessageId> {
        let msg_id = self
            .pgmq
            .send(queue_name, body)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "send", e.to_string()))?;
        debug!(queue = %queue_name, msg_id, "Message sent");
        Ok(MessageId::from(msg_id))
    }

    async fn receive_messages(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
        wait: Duration,
    ) -> MessagingResult<Vec<QueuedMessage<Value>>> {
        let deadline = Instant::now() + wait;
        loop {
            let leased = self
                .read_once(queue_name, max_messages, visibility_timeout)
                .await?;
            if !leased.is_empty() {
                return Ok(leased);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn ack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
    ) -> MessagingResult<()> {
        let msg_id = Self::msg_id(receipt_handle)?;
        let deleted = self
            .pgmq
            .delete(queue_name, msg_id)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "delete", e.to_string()))?;
        if deleted == 0 {
            return Err(MessagingError::message_not_found(msg_id.to_string()));
        }
        Ok(())
    }

    async fn nack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
        requeue: bool,
    ) -> MessagingResult<()> {
        if requeue {
            return self
                .extend_visibility(queue_name, receipt_handle, Duration::ZERO)
                .await;
        }
        let msg_id = Self::msg_id(receipt_handle)?;
        self.pgmq
            .archive(queue_name, msg_id)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "archive", e.to_string()))?;
        Ok(())
    }

    async fn extend_visibility(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
        extension: Duration,
    ) -> MessagingResult<()> {
        Self::validate_queue_name(queue_name)?;
        let msg_id = Self::msg_id(receipt_handle)?;
        let sql = format!(
            "UPDATE pgmq.q_{queue_name} SET vt = clock_timestamp() + make_interval(secs => $2) WHERE msg_id = $1"
        );
        let result = sqlx::query(&sql)
            .bind(msg_id)
            .bind(extension.as_secs_f64())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MessagingError::message_not_found(msg_id.to_string()));
        }
        Ok(())
    }

    async fn queue_stats(&self, queue_name: &str) -> MessagingResult<QueueStats> {
        Self::validate_queue_name(queue_name)?;
        let sql = format!(
            "SELECT count(*)::BIGINT AS total, \
                    count(*) FILTER (WHERE vt > clock_timestamp())::BIGINT AS in_flight, \
                    EXTRACT(EPOCH FROM (clock_timestamp() - min(enqueued_at)))::FLOAT8 AS oldest_age, \
                    (SELECT count(*) FROM pgmq.a_{queue_name})::BIGINT AS archived \
             FROM pgmq.q_{queue_name}"
        );
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;

        let total: i64 = row.try_get("total")?;
        let in_flight: i64 = row.try_get("in_flight")?;
        let archived: i64 = row.try_get("archived")?;
        let oldest_age: Option<f64> = row.try_get("oldest_age")?;

        let mut stats = QueueStats::new(queue_name, total.max(0) as u64)
            .with_in_flight_count(in_flight.max(0) as u64)
            .with_dead_lettered_count(archived.max(0) as u64);
        if let Some(age) = oldest_age.filter(|a| *a >= 0.0) {
            stats = stats.with_oldest_message_age(Duration::from_secs_f64(age));
        }
        Ok(stats)
    }

    async fn health_check(&self) -> MessagingResult<bool> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "pgmq"
    }
}
