//! # Messaging
//!
//! The ingestion queue abstraction: a [`TaskQueue`] trait with lease, acknowledge and
//! redrive semantics, plus an in-memory provider and a PostgreSQL (pgmq) provider.

pub mod errors;
pub mod providers;
pub mod traits;
pub mod types;

pub use errors::{MessagingError, MessagingResult};
pub use providers::{InMemoryTaskQueue, PgmqTaskQueue, RedrivePolicy};
pub use traits::TaskQueue;
pub use types::{MessageId, QueueStats, QueuedMessage, ReceiptHandle};
