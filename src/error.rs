//! # Catalog Error Types
//!
//! Crate-wide error type. Every failure that crosses a component boundary is one of
//! these variants, and each variant carries an [`ErrorClass`] so the queue consumer can
//! decide between acknowledging and leaving a message for redelivery without inspecting
//! error strings.
//!
//! Validation problems are deliberately absent: they travel as data
//! (`ValidationOutcome`) rather than as errors.

use std::time::Duration;

use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigurationError;
use crate::database::StoreError;
use crate::messaging::MessagingError;
use crate::objects::ObjectStoreError;

/// Retry classification for a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// May succeed if retried; the message must not be acknowledged
    Transient,
    /// Will never succeed; the message is rejected and acknowledged
    Permanent,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Permanent => write!(f, "permanent"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Object store error: {0}")]
    ObjectStore(#[from] ObjectStoreError),

    #[error("Catalog store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Operation {operation} timed out after {}ms", timeout.as_millis())]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("Notification delivery failed: {0}")]
    Notification(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CatalogError {
    /// Create a timeout error for the named operation
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Create a notification delivery error
    pub fn notification(message: impl Into<String>) -> Self {
        Self::Notification(message.into())
    }

    /// Create an invalid query error
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Classify this error for ack/no-ack decisions
    pub fn class(&self) -> ErrorClass {
        match self {
            CatalogError::ObjectStore(e) if e.is_permanent() => ErrorClass::Permanent,
            CatalogError::ObjectStore(_) => ErrorClass::Transient,
            CatalogError::Store(_) => ErrorClass::Transient,
            CatalogError::Cache(_) => ErrorClass::Transient,
            CatalogError::Messaging(_) => ErrorClass::Transient,
            CatalogError::Timeout { .. } => ErrorClass::Transient,
            CatalogError::Notification(_) => ErrorClass::Transient,
            CatalogError::Configuration(_) => ErrorClass::Permanent,
            CatalogError::InvalidQuery(_) => ErrorClass::Permanent,
            CatalogError::Internal(_) => ErrorClass::Transient,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Whether the read path should surface this as "service unavailable"
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            CatalogError::Store(_) | CatalogError::Timeout { .. } | CatalogError::Internal(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
