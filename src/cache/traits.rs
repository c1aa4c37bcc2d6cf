//! Cache service trait definition

use super::errors::CacheResult;
use std::time::Duration;

/// Key/value cache with per-entry TTL
///
/// The cache is a disposable projection: callers treat every error as a miss on reads
/// and as a failed invalidation on writes.
pub trait CacheService: Send + Sync {
    /// Returns `Ok(Some(value))` on hit, `Ok(None)` on miss
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = CacheResult<Option<String>>> + Send;

    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    /// Delete a key; deleting an absent key succeeds
    fn delete(&self, key: &str) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    fn health_check(&self) -> impl std::future::Future<Output = CacheResult<bool>> + Send;

    fn provider_name(&self) -> &'static str;
}
