//! # Catalog Store Errors

use thiserror::Error;

/// Postgres SQLSTATE codes that a retry can resolve
const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Catalog store unavailable: {message}")]
    Unavailable { message: String },

    /// Lost a race with a concurrent writer (unique key, serialization, deadlock)
    #[error("Write conflict during {operation}: {message}")]
    Conflict { operation: String, message: String },

    #[error("Query failed: {operation}: {message}")]
    Query { operation: String, message: String },

    /// A stored row could not be mapped back to a record
    #[error("Corrupt row for {key}: {message}")]
    CorruptRow { key: String, message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn conflict(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn query(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn corrupt_row(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptRow {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
                match code.as_str() {
                    UNIQUE_VIOLATION | SERIALIZATION_FAILURE | DEADLOCK_DETECTED => {
                        StoreError::conflict(format!("sqlstate {code}"), db_err.to_string())
                    }
                    _ => StoreError::query("database", db_err.to_string()),
                }
            }
            sqlx::Error::PoolTimedOut => StoreError::unavailable("timed out acquiring a connection"),
            sqlx::Error::PoolClosed => StoreError::unavailable("connection pool is closed"),
            sqlx::Error::Io(e) => StoreError::unavailable(e.to_string()),
            sqlx::Error::Tls(e) => StoreError::unavailable(e.to_string()),
            sqlx::Error::RowNotFound => StoreError::query("query", "no rows found"),
            other => StoreError::query("database", other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Migration {
            message: err.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
