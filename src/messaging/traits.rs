//! # Task Queue Trait
//!
//! Provider-agnostic operations on the at-least-once ingestion queue.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::errors::MessagingResult;
use super::types::{MessageId, QueueStats, QueuedMessage, ReceiptHandle};

/// At-least-once queue with visibility-timeout leases
///
/// Message bodies are raw JSON: the envelope shape (direct task, storage event,
/// wrapped notification) is decoded by the consumer, not by the provider.
///
/// Providers must guarantee that:
///
/// - a received message stays invisible for the lease duration
/// - an unacknowledged message becomes visible again after the lease with an
///   incremented receive count
/// - a message received more than the configured redrive threshold is moved to the
///   provider's dead-letter path instead of being delivered again
#[async_trait]
pub trait TaskQueue: Send + Sync + 'static {
    /// Create a queue if it doesn't exist (idempotent)
    async fn ensure_queue(&self, queue_name: &str) -> MessagingResult<()>;

    async fn send_message(&self, queue_name: &str, body: &Value) -> MessagingResult<MessageId>;

    /// Lease up to `max_messages`, waiting at most `wait` for one to become available
    ///
    /// Returns an empty vector when the wait elapses with nothing visible.
    async fn receive_messages(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
        wait: Duration,
    ) -> MessagingResult<Vec<QueuedMessage<Value>>>;

    /// Delete a processed message
    async fn ack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
    ) -> MessagingResult<()>;

    /// `requeue = true` makes the message visible immediately; `false` dead-letters it
    async fn nack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
        requeue: bool,
    ) -> MessagingResult<()>;

    /// Push the lease expiry out by `extension` from now
    async fn extend_visibility(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
        extension: Duration,
    ) -> MessagingResult<()>;

    async fn queue_stats(&self, queue_name: &str) -> MessagingResult<QueueStats>;

    async fn health_check(&self) -> MessagingResult<bool>;

    fn provider_name(&self) -> &'static str;
}
