//! # Object Store
//!
//! Source of uploaded payloads. Missing objects are a permanent failure; anything else
//! the store reports is treated as transient.

pub mod errors;
pub mod filesystem;
pub mod in_memory;
pub mod store;

pub use errors::{ObjectStoreError, ObjectStoreResult};
pub use filesystem::FileSystemObjectStore;
pub use in_memory::InMemoryObjectStore;
pub use store::{FetchedObject, ObjectStore};
