//! # Query Cache
//!
//! Disposable, invalidation-driven projection of catalog reads. The relational store is
//! the only source of truth; nothing here has write authority over records.

pub mod errors;
pub mod keys;
pub mod provider;
pub mod providers;
pub mod traits;

pub use errors::{CacheError, CacheResult};
pub use keys::{CacheKeys, CacheScope};
pub use provider::CacheProvider;
pub use providers::{MokaCacheService, NoOpCacheService};
pub use traits::CacheService;
