//! Read path over the catalog store with a generation-scoped result cache

pub mod service;

pub use service::{CacheStatus, CachedPage, QueryResult, QueryService, QuerySettings, RecordLookup};
