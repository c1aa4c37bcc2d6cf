//! # Messaging Error Types
//!
//! Failures raised by the ingestion queue providers. Every variant is treated as transient
//! by the consumer: a message whose ack fails is simply redelivered.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Queue backend error during {operation}: {message}")]
    Backend { operation: String, message: String },

    #[error("Queue {queue_name} rejected {operation}: {message}")]
    QueueOperation {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Queue {queue_name} does not exist")]
    QueueNotFound { queue_name: String },

    #[error("Queue name {queue_name:?} is unusable: {reason}")]
    InvalidQueueName { queue_name: String, reason: String },

    /// The lease behind a receipt expired and the message moved on
    #[error("Message {message_id} is no longer leased")]
    MessageNotFound { message_id: String },

    #[error("Receipt handle {handle:?} is not recognized")]
    InvalidReceiptHandle { handle: String },

    #[error("Message body could not be encoded: {message}")]
    Codec { message: String },
}

impl MessagingError {
    pub fn backend(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn queue_operation(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn queue_not_found(queue_name: impl Into<String>) -> Self {
        Self::QueueNotFound {
            queue_name: queue_name.into(),
        }
    }

    pub fn invalid_queue_name(queue_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidQueueName {
            queue_name: queue_name.into(),
            reason: reason.into(),
        }
    }

    pub fn message_not_found(message_id: impl Into<String>) -> Self {
        Self::MessageNotFound {
            message_id: message_id.into(),
        }
    }

    pub fn invalid_receipt_handle(handle: impl Into<String>) -> Self {
        Self::InvalidReceiptHandle {
            handle: handle.into(),
        }
    }

    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// True when the message was already gone, so acking it again is pointless
    pub fn is_lost_lease(&self) -> bool {
        matches!(
            self,
            Self::MessageNotFound { .. } | Self::InvalidReceiptHandle { .. }
        )
    }
}

impl From<sqlx::Error> for MessagingError {
    fn from(err: sqlx::Error) -> Self {
        let operation = match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => "acquire",
            sqlx::Error::Database(_) | sqlx::Error::RowNotFound => "query",
            _ => "connect",
        };
        MessagingError::backend(operation, err.to_string())
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        MessagingError::codec(err.to_string())
    }
}

impl From<pgmq::errors::PgmqError> for MessagingError {
    fn from(err: pgmq::errors::PgmqError) -> Self {
        MessagingError::backend("pgmq", err.to_string())
    }
}

pub type MessagingResult<T> = Result<T, MessagingError>;
