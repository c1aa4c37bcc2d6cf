//! Queue provider implementations

pub mod in_memory;
pub mod pgmq;

pub use in_memory::{InMemoryTaskQueue, RedrivePolicy};
pub use pgmq::PgmqTaskQueue;
