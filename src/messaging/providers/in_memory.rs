//! # In-Memory Task Queue
//!
//! Queue emulation for tests and local development.
//!
//! - **Leases**: received messages are invisible until the visibility timeout elapses,
//!   then redeliver with an incremented receive count
//! - **Long-poll**: receivers park on a `Notify` until a send, a requeue, or the next
//!   lease expiry
//! - **Redrive**: with a [`RedrivePolicy`], a message that has already been received
//!   `max_receive_count` times is moved to the dead-letter queue instead of redelivered

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{Notify, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::messaging::errors::{MessagingError, MessagingResult};
use crate::messaging::traits::TaskQueue;
use crate::messaging::types::{MessageId, QueueStats, QueuedMessage, ReceiptHandle};

/// Where exhausted messages go and after how many receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedrivePolicy {
    pub dead_letter_queue: String,
    pub max_receive_count: u32,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    id: u64,
    body: Value,
    enqueued_at: DateTime<Utc>,
    /// None = visible now
    visible_at: Option<Instant>,
    receive_count: u32,
}

impl StoredMessage {
    fn is_visible(&self, now: Instant) -> bool {
        self.visible_at.map(|vt| vt <= now).unwrap_or(true)
    }
}

#[derive(Debug, Default)]
struct MemoryQueue {
    messages: VecDeque<StoredMessage>,
    redrive: Option<RedrivePolicy>,
    total_sent: u64,
    total_received: u64,
    total_acked: u64,
    total_dead_lettered: u64,
}

/// Outcome of one non-blocking receive attempt
struct Attempt {
    leased: Vec<QueuedMessage<Value>>,
    next_visible: Option<Instant>,
}

#[derive(Debug)]
pub struct InMemoryTaskQueue {
    queues: RwLock<HashMap<String, MemoryQueue>>,
    next_id: AtomicU64,
    notify: Notify,
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            notify: Notify::new(),
        }
    }

    /// Attach a redrive policy to `queue_name`, creating both queues
    pub async fn configure_redrive(&self, queue_name: &str, policy: RedrivePolicy) {
        let mut queues = self.queues.write().await;
        queues
            .entry(policy.dead_letter_queue.clone())
            .or_default();
        queues.entry(queue_name.to_string()).or_default().redrive = Some(policy);
    }

    /// Messages currently stored in a queue, visible or not
    pub async fn queue_length(&self, queue_name: &str) -> usize {
        let queues = self.queues.read().await;
        queues
            .get(queue_name)
            .map(|q| q.messages.len())
            .unwrap_or(0)
    }

    /// Bodies of every message in a queue, in order
    pub async fn peek_bodies(&self, queue_name: &str) -> Vec<Value> {
        let queues = self.queues.read().await;
        queues
            .get(queue_name)
            .map(|q| q.messages.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    /// Expire every outstanding lease on a queue immediately
    pub async fn expire_leases(&self, queue_name: &str) {
        let mut queues = self.queues.write().await;
        if let Some(queue) = queues.get_mut(queue_name) {
            for msg in queue.messages.iter_mut() {
                msg.visible_at = None;
            }
        }
        drop(queues);
        self.notify.notify_waiters();
    }

    async fn try_receive(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> MessagingResult<Attempt> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let now = Instant::now();
        let redrive = queue.redrive.clone();
        let mut leased = Vec::new();
        let mut exhausted = Vec::new();
        let mut next_visible: Option<Instant> = None;

        for msg in queue.messages.iter_mut() {
            if !msg.is_visible(now) {
                if let Some(vt) = msg.visible_at {
                    next_visible = Some(next_visible.map_or(vt, |n| n.min(vt)));
                }
                continue;
            }
            if let Some(policy) = &redrive {
                if msg.receive_count >= policy.max_receive_count {
                    exhausted.push(msg.id);
                    continue;
                }
            }
            if leased.len() >= max_messages {
                continue;
            }

            msg.visible_at = Some(now + visibility_timeout);
            msg.receive_count += 1;
            leased.push(QueuedMessage::new(
                ReceiptHandle::from(msg.id),
                msg.body.clone(),
                msg.receive_count,
                msg.enqueued_at,
            ));
        }
        queue.total_received += leased.len() as u64;

        if let (Some(policy), false) = (redrive, exhausted.is_empty()) {
            let mut moved = Vec::with_capacity(exhausted.len());
            queue.messages.retain(|m| {
                if exhausted.contains(&m.id) {
                    moved.push(m.clone());
                    false
                } else {
                    true
                }
            });
            queue.total_dead_lettered += moved.len() as u64;

            warn!(
                queue = %queue_name,
                dead_letter_queue = %policy.dead_letter_queue,
                count = moved.len(),
                "Redriving exhausted messages to dead-letter queue"
            );
            let dlq = queues.entry(policy.dead_letter_queue.clone()).or_default();
            for mut msg in moved {
                msg.visible_at = None;
                dlq.messages.push_back(msg);
                dlq.total_sent += 1;
            }
        }

        Ok(Attempt {
            leased,
            next_visible,
        })
    }

    async fn remove(&self, queue_name: &str, receipt_handle: &ReceiptHandle) -> MessagingResult<StoredMessage> {
        let message_id = receipt_handle
            .as_u64()
            .ok_or_else(|| MessagingError::invalid_receipt_handle(receipt_handle.as_str()))?;

        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let pos = queue
            .messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or_else(|| MessagingError::message_not_found(message_id.to_string()))?;

        queue
            .messages
            .remove(pos)
            .ok_or_else(|| MessagingError::message_not_found(message_id.to_string()))
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn ensure_queue(&self, queue_name: &str) -> MessagingResult<()> {
        let mut queues = self.queues.write().await;
        queues.entry(queue_name.to_string()).or_default();
        Ok(())
    }

    async fn send_message(&self, queue_name: &str, body: &Value) -> MessagingResult<MessageId> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        queue.total_sent += 1;
        queue.messages.push_back(StoredMessage {
            id,
            body: body.clone(),
            enqueued_at: Utc::now(),
            visible_at: None,
            receive_count: 0,
        });
        drop(queues);

        self.notify.notify_waiters();
        debug!(queue = %queue_name, msg_id = id, "Message sent");
        Ok(MessageId::from(id))
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
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let attempt = self
                .try_receive(queue_name, max_messages, visibility_timeout)
                .await?;
            if !attempt.leased.is_empty() {
                return Ok(attempt.leased);
            }
            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }

            let wake_at = attempt
                .next_visible
                .map_or(deadline, |vt| vt.min(deadline));
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn ack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
    ) -> MessagingResult<()> {
        self.remove(queue_name, receipt_handle).await?;
        let mut queues = self.queues.write().await;
        if let Some(queue) = queues.get_mut(queue_name) {
            queue.total_acked += 1;
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
            let message_id = receipt_handle
                .as_u64()
                .ok_or_else(|| MessagingError::invalid_receipt_handle(receipt_handle.as_str()))?;
            let mut queues = self.queues.write().await;
            let queue = queues
                .get_mut(queue_name)
                .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;
            let msg = queue
                .messages
                .iter_mut()
                .find(|m| m.id == message_id)
                .ok_or_else(|| MessagingError::message_not_found(message_id.to_string()))?;
            msg.visible_at = None;
            drop(queues);
            self.notify.notify_waiters();
            return Ok(());
        }

        let mut msg = self.remove(queue_name, receipt_handle).await?;
        let mut queues = self.queues.write().await;
        let policy = queues.get(queue_name).and_then(|q| q.redrive.clone());
        if let Some(queue) = queues.get_mut(queue_name) {
            queue.total_dead_lettered += 1;
        }
        if let Some(policy) = policy {
            msg.visible_at = None;
            let dlq = queues.entry(policy.dead_letter_queue).or_default();
            dlq.messages.push_back(msg);
            dlq.total_sent += 1;
        }
        Ok(())
    }

    async fn extend_visibility(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
        extension: Duration,
    ) -> MessagingResult<()> {
        let message_id = receipt_handle
            .as_u64()
            .ok_or_else(|| MessagingError::invalid_receipt_handle(receipt_handle.as_str()))?;

        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let msg = queue
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| MessagingError::message_not_found(message_id.to_string()))?;
        msg.visible_at = Some(Instant::now() + extension);
        Ok(())
    }

    async fn queue_stats(&self, queue_name: &str) -> MessagingResult<QueueStats> {
        let queues = self.queues.read().await;
        let queue = queues
            .get(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let now = Instant::now();
        let in_flight = queue
            .messages
            .iter()
            .filter(|m| !m.is_visible(now))
            .count() as u64;

        let mut stats = QueueStats::new(queue_name, queue.messages.len() as u64)
            .with_in_flight_count(in_flight)
            .with_dead_lettered_count(queue.total_dead_lettered);

        if let Some(oldest) = queue.messages.iter().map(|m| m.enqueued_at).min() {
            if let Ok(age) = (Utc::now() - oldest).to_std() {
                stats = stats.with_oldest_message_age(age);
            }
        }
        Ok(stats)
    }

    async fn health_check(&self) -> MessagingResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
