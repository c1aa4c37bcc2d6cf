//! # Queue Consumer
//!
//! A fixed pool of worker loops over the ingestion queue. Each worker leases one message
//! at a time with a bounded long-poll, expands it into tasks, runs every task through the
//! [`TaskProcessor`], and acknowledges the message only when every task reached a
//! terminal disposition. Anything else is left alone: the lease expires, the queue
//! redelivers, and idempotent writes make the repeat harmless.
//!
//! Rejections are published once per message, just before the ack. A message left for
//! redelivery publishes nothing unless this was its final delivery.
//!
//! Shutdown stops new leases; a worker that is mid-message finishes it first.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::processor::{TaskDisposition, TaskProcessor};
use crate::cache::{CacheProvider, CacheService};
use crate::config::{ConsumerConfig, QueueConfig};
use crate::error::Result;
use crate::logging::log_error;
use crate::messaging::{QueuedMessage, TaskQueue};
use crate::models::IngestionTask;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSettings {
    pub queue_name: String,
    pub worker_count: usize,
    pub lease_duration: Duration,
    pub long_poll_wait: Duration,
    /// Pause after a failed receive
    pub error_backoff: Duration,
    pub shutdown_timeout: Duration,
}

impl ConsumerSettings {
    pub fn from_config(queue: &QueueConfig, consumer: &ConsumerConfig) -> Self {
        Self {
            queue_name: queue.queue_name.clone(),
            worker_count: consumer.worker_count,
            lease_duration: queue.lease_duration(),
            long_poll_wait: queue.long_poll_wait(),
            error_backoff: consumer.error_backoff(),
            shutdown_timeout: consumer.shutdown_timeout(),
        }
    }
}

/// What happened to a leased message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDisposition {
    Acknowledged,
    /// At least one task needs a retry, or the ack itself failed
    LeftForRedelivery,
}

#[derive(Debug, Default)]
pub struct ConsumerStats {
    pub messages_received: AtomicU64,
    pub messages_acked: AtomicU64,
    pub messages_left: AtomicU64,
    pub envelope_rejections: AtomicU64,
    pub tasks_completed: AtomicU64,
    pub tasks_rejected: AtomicU64,
    pub tasks_retried: AtomicU64,
    pub deliveries_exhausted: AtomicU64,
    pub receive_errors: AtomicU64,
    pub ack_errors: AtomicU64,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_acked: self.messages_acked.load(Ordering::Relaxed),
            messages_left: self.messages_left.load(Ordering::Relaxed),
            envelope_rejections: self.envelope_rejections.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_rejected: self.tasks_rejected.load(Ordering::Relaxed),
            tasks_retried: self.tasks_retried.load(Ordering::Relaxed),
            deliveries_exhausted: self.deliveries_exhausted.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            ack_errors: self.ack_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStatsSnapshot {
    pub messages_received: u64,
    pub messages_acked: u64,
    pub messages_left: u64,
    pub envelope_rejections: u64,
    pub tasks_completed: u64,
    pub tasks_rejected: u64,
    pub tasks_retried: u64,
    pub deliveries_exhausted: u64,
    pub receive_errors: u64,
    pub ack_errors: u64,
}

pub struct QueueConsumer<C: CacheService = CacheProvider> {
    consumer_id: Uuid,
    queue: Arc<dyn TaskQueue>,
    processor: Arc<TaskProcessor<C>>,
    settings: ConsumerSettings,
    is_running: AtomicBool,
    shutdown: Notify,
    stats: ConsumerStats,
}

impl<C: CacheService> std::fmt::Debug for QueueConsumer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConsumer")
            .field("consumer_id", &self.consumer_id)
            .field("queue_provider", &self.queue.provider_name())
            .field("settings", &self.settings)
            .field("is_running", &self.is_running.load(Ordering::Relaxed))
            .finish()
    }
}

impl<C: CacheService + 'static> QueueConsumer<C> {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        processor: Arc<TaskProcessor<C>>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            consumer_id: Uuid::new_v4(),
            queue,
            processor,
            settings,
            is_running: AtomicBool::new(false),
            shutdown: Notify::new(),
            stats: ConsumerStats::default(),
        }
    }

    pub fn consumer_id(&self) -> Uuid {
        self.consumer_id
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> ConsumerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Spawn the worker pool
    pub async fn start(self: &Arc<Self>) -> Result<Vec<JoinHandle<()>>> {
        self.queue.ensure_queue(&self.settings.queue_name).await?;
        self.is_running.store(true, Ordering::SeqCst);

        info!(
            consumer_id = %self.consumer_id,
            queue = %self.settings.queue_name,
            workers = self.settings.worker_count,
            lease = ?self.settings.lease_duration,
            "Starting queue consumer"
        );

        let handles = (0..self.settings.worker_count)
            .map(|worker_id| {
                let consumer = Arc::clone(self);
                tokio::spawn(async move { consumer.worker_loop(worker_id).await })
            })
            .collect();
        Ok(handles)
    }

    /// Stop leasing new messages
    pub fn stop(&self) {
        if self.is_running.swap(false, Ordering::SeqCst) {
            info!(consumer_id = %self.consumer_id, "Stopping queue consumer");
        }
        self.shutdown.notify_waiters();
    }

    /// Stop and wait for in-flight messages, bounded by the shutdown timeout
    pub async fn shutdown(&self, handles: Vec<JoinHandle<()>>) {
        self.stop();
        let joined = tokio::time::timeout(
            self.settings.shutdown_timeout,
            futures::future::join_all(handles),
        )
        .await;

        match joined {
            Ok(_) => info!(
                consumer_id = %self.consumer_id,
                stats = ?self.stats.snapshot(),
                "Queue consumer stopped"
            ),
            Err(_) => warn!(
                consumer_id = %self.consumer_id,
                timeout = ?self.settings.shutdown_timeout,
                "Workers still busy at shutdown timeout; their messages will redeliver"
            ),
        }
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize) {
        debug!(consumer_id = %self.consumer_id, worker_id, "Worker started");

        while self.is_running() {
            let received = tokio::select! {
                _ = self.shutdown.notified() => break,
                received = self.receive() => received,
            };

            match received {
                Ok(Some(message)) => {
                    self.handle_message(message).await;
                }
                Ok(None) => {}
                Err(e) => {
                    self.stats.receive_errors.fetch_add(1, Ordering::Relaxed);
                    log_error(
                        "queue_consumer",
                        "receive",
                        &e.to_string(),
                        Some(&self.settings.queue_name),
                    );
                    tokio::time::sleep(self.settings.error_backoff).await;
                }
            }
        }

        debug!(consumer_id = %self.consumer_id, worker_id, "Worker stopped");
    }

    async fn receive(&self) -> Result<Option<QueuedMessage<Value>>> {
        let mut messages = self
            .queue
            .receive_messages(
                &self.settings.queue_name,
                1,
                self.settings.lease_duration,
                self.settings.long_poll_wait,
            )
            .await?;
        Ok(messages.pop())
    }

    /// Lease and handle at most one message; `None` when the long-poll came back empty
    pub async fn poll_once(&self) -> Result<Option<MessageDisposition>> {
        match self.receive().await? {
            Some(message) => Ok(Some(self.handle_message(message).await)),
            None => Ok(None),
        }
    }

    /// Run every task of a leased message and acknowledge if all are terminal
    pub async fn handle_message(&self, message: QueuedMessage<Value>) -> MessageDisposition {
        self.stats.messages_received.fetch_add(1, Ordering::Relaxed);
        let receipt = message.receipt_handle.clone();
        if message.is_redelivery() {
            debug!(
                receipt = %receipt,
                receive_count = message.receive_count,
                "Redelivered message"
            );
        }

        let all_terminal = match IngestionTask::from_message(&message) {
            Ok(tasks) => {
                let final_delivery = self.processor.is_final_delivery(message.receive_count);
                self.run_tasks(&tasks, final_delivery).await
            }
            Err(envelope_error) => {
                warn!(
                    receipt = %receipt,
                    error = %envelope_error,
                    "Undecodable queue message"
                );
                match self
                    .processor
                    .router()
                    .route_undecodable(&message, &envelope_error)
                    .await
                {
                    Ok(_) => {
                        self.stats.envelope_rejections.fetch_add(1, Ordering::Relaxed);
                        true
                    }
                    Err(e) => {
                        warn!(receipt = %receipt, error = %e, "Envelope rejection not delivered");
                        false
                    }
                }
            }
        };

        if !all_terminal {
            self.stats.messages_left.fetch_add(1, Ordering::Relaxed);
            return MessageDisposition::LeftForRedelivery;
        }

        match self
            .queue
            .ack_message(&self.settings.queue_name, &receipt)
            .await
        {
            Ok(()) => {
                self.stats.messages_acked.fetch_add(1, Ordering::Relaxed);
                MessageDisposition::Acknowledged
            }
            Err(e) => {
                self.stats.ack_errors.fetch_add(1, Ordering::Relaxed);
                self.stats.messages_left.fetch_add(1, Ordering::Relaxed);
                if e.is_lost_lease() {
                    // another worker holds it now; the writes are idempotent
                    warn!(receipt = %receipt, error = %e, "Lease expired before acknowledgement");
                } else {
                    error!(receipt = %receipt, error = %e, "Failed to acknowledge message");
                }
                MessageDisposition::LeftForRedelivery
            }
        }
    }

    async fn run_tasks(&self, tasks: &[IngestionTask], final_delivery: bool) -> bool {
        let mut all_terminal = true;
        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            let outcome = self.processor.evaluate(task).await;
            let counter = match outcome.disposition {
                TaskDisposition::Completed => &self.stats.tasks_completed,
                TaskDisposition::Rejected => &self.stats.tasks_rejected,
                TaskDisposition::Retry => &self.stats.tasks_retried,
            };
            counter.fetch_add(1, Ordering::Relaxed);
            if outcome.exhausted {
                self.stats.deliveries_exhausted.fetch_add(1, Ordering::Relaxed);
            }
            all_terminal &= outcome.disposition.is_terminal();
            outcomes.push(outcome);
        }

        // a redelivery would evaluate these tasks again and report them a second time
        if !all_terminal && !final_delivery {
            return false;
        }

        for (task, outcome) in tasks.iter().zip(&outcomes) {
            if let Err(e) = self.processor.publish_rejection(outcome).await {
                warn!(
                    object_ref = %task.object_ref,
                    error = %e,
                    "Rejection not delivered; leaving message for redelivery"
                );
                return false;
            }
        }
        all_terminal
    }
}
