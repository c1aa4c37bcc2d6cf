//! # Dead-Letter Router
//!
//! Builds [`RejectionRecord`]s and hands them to a [`NotificationSink`] addressed to the
//! originating provider. Three situations produce a rejection:
//!
//! - a task whose payload (or part of it) failed validation
//! - a queue message whose body matches no known envelope
//! - a task that failed transiently on its final allowed delivery
//!
//! Sink failures are transient: the caller leaves the message unacknowledged so the
//! notification is attempted again on redelivery.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{CatalogError, Result};
use crate::logging::log_ingestion_operation;
use crate::messaging::{QueuedMessage, TaskQueue};
use crate::models::{
    EnvelopeError, IngestionTask, RejectionRecord, Rule, Violation, UNKNOWN_PROVIDER,
};

/// pgmq queue names are limited so the backing tables stay under the identifier limit
const MAX_QUEUE_NAME_LEN: usize = 47;

/// Destination for rejection records
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn publish(&self, rejection: &RejectionRecord) -> Result<()>;

    fn sink_name(&self) -> &'static str;
}

/// Collects rejections in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationSink {
    published: Arc<Mutex<Vec<RejectionRecord>>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<RejectionRecord> {
        self.published.lock().clone()
    }

    pub fn for_provider(&self, provider_id: &str) -> Vec<RejectionRecord> {
        self.published
            .lock()
            .iter()
            .filter(|r| r.provider_id == provider_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.published.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.published.lock().is_empty()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn publish(&self, rejection: &RejectionRecord) -> Result<()> {
        self.published.lock().push(rejection.clone());
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "in_memory"
    }
}

/// Emits each rejection as a structured warning
#[derive(Debug, Clone, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn publish(&self, rejection: &RejectionRecord) -> Result<()> {
        let violations = serde_json::to_string(&rejection.violations)
            .map_err(|e| CatalogError::notification(e.to_string()))?;
        warn!(
            object_ref = %rejection.object_ref,
            provider_id = %rejection.provider_id,
            delivery_count = rejection.delivery_count,
            violations = %violations,
            "REJECTION"
        );
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "log"
    }
}

/// Sends each rejection to a per-provider queue named `{prefix}_{provider}`
pub struct QueueNotificationSink {
    queue: Arc<dyn TaskQueue>,
    prefix: String,
}

impl std::fmt::Debug for QueueNotificationSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueNotificationSink")
            .field("provider", &self.queue.provider_name())
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl QueueNotificationSink {
    pub fn new(queue: Arc<dyn TaskQueue>, prefix: impl Into<String>) -> Self {
        Self {
            queue,
            prefix: prefix.into(),
        }
    }

    /// Queue-name-safe destination for a provider: lowercase `[a-z0-9_]`, bounded length
    pub fn queue_name_for(&self, provider_id: &str) -> String {
        let sanitized: String = format!("{}_{}", self.prefix, provider_id)
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        sanitized.chars().take(MAX_QUEUE_NAME_LEN).collect()
    }
}

#[async_trait]
impl NotificationSink for QueueNotificationSink {
    async fn publish(&self, rejection: &RejectionRecord) -> Result<()> {
        let queue_name = self.queue_name_for(&rejection.provider_id);
        let body =
            serde_json::to_value(rejection).map_err(|e| CatalogError::notification(e.to_string()))?;

        self.queue.ensure_queue(&queue_name).await?;
        let message_id = self.queue.send_message(&queue_name, &body).await?;

        info!(
            queue = %queue_name,
            msg_id = %message_id,
            object_ref = %rejection.object_ref,
            "Rejection published"
        );
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "queue"
    }
}

#[derive(Clone)]
pub struct DeadLetterRouter {
    sink: Arc<dyn NotificationSink>,
}

impl std::fmt::Debug for DeadLetterRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadLetterRouter")
            .field("sink", &self.sink.sink_name())
            .finish()
    }
}

impl DeadLetterRouter {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Report every violation of one task in a single notification
    pub async fn route_rejection(
        &self,
        task: &IngestionTask,
        violations: Vec<Violation>,
    ) -> Result<RejectionRecord> {
        let rejection = RejectionRecord::for_task(task, violations);
        self.deliver(&rejection).await?;
        Ok(rejection)
    }

    /// Publish a rejection built earlier
    pub async fn deliver(&self, rejection: &RejectionRecord) -> Result<()> {
        self.publish(rejection, "rejected").await
    }

    /// Report a task whose transient failure outlived its final delivery
    pub async fn report_exhausted(
        &self,
        task: &IngestionTask,
        last_error: &CatalogError,
    ) -> Result<RejectionRecord> {
        let rejection = RejectionRecord::delivery_exhausted(task, &last_error.to_string());
        self.publish(&rejection, "exhausted").await?;
        Ok(rejection)
    }

    /// Report a message whose body names no object
    pub async fn route_undecodable(
        &self,
        message: &QueuedMessage<Value>,
        error: &EnvelopeError,
    ) -> Result<RejectionRecord> {
        let rejection = RejectionRecord {
            object_ref: format!("message:{}", message.receipt_handle),
            provider_id: UNKNOWN_PROVIDER.to_string(),
            violations: vec![Violation::new("$", Rule::MessageEnvelope, error.to_string())],
            attempted_at: chrono::Utc::now(),
            delivery_count: message.receive_count,
        };
        self.publish(&rejection, "undecodable").await?;
        Ok(rejection)
    }

    async fn publish(&self, rejection: &RejectionRecord, status: &str) -> Result<()> {
        let rules: Vec<&str> = rejection.violations.iter().map(|v| v.rule.as_str()).collect();
        let details = rules.join(",");
        log_ingestion_operation(
            "dead_letter",
            &rejection.object_ref,
            Some(&rejection.provider_id),
            status,
            Some(&details),
        );
        self.sink.publish(rejection).await
    }
}
