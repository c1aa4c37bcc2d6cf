//! Object store errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("Object not found: {object_ref}")]
    NotFound { object_ref: String },

    /// Key escapes the bucket or is otherwise unaddressable
    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Object store unavailable: {message}")]
    Unavailable { message: String },
}

impl ObjectStoreError {
    pub fn not_found(object_ref: impl Into<String>) -> Self {
        Self::NotFound {
            object_ref: object_ref.into(),
        }
    }

    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ObjectStoreError::NotFound { .. })
    }

    /// Retrying cannot help
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ObjectStoreError::NotFound { .. } | ObjectStoreError::InvalidKey { .. }
        )
    }
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;
