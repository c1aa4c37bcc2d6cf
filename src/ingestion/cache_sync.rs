//! # Cache Synchronizer
//!
//! Runs after a committed write. Deletes the generation marker of every scope the old
//! and new version of each written record belongs to; the next read under any of those
//! scopes mints a fresh generation and repopulates from the store. New values are never
//! written into the cache from here.

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::debug;

use super::writer::WriteSummary;
use crate::cache::{CacheKeys, CacheProvider, CacheScope, CacheService};
use crate::error::{CatalogError, Result};

#[derive(Debug, Clone)]
pub struct CacheSynchronizer<C: CacheService = CacheProvider> {
    cache: C,
    keys: CacheKeys,
    timeout: Duration,
}

impl<C: CacheService> CacheSynchronizer<C> {
    pub fn new(cache: C, keys: CacheKeys, timeout: Duration) -> Self {
        Self {
            cache,
            keys,
            timeout,
        }
    }

    /// Scopes whose cached results a write summary may have changed
    pub fn affected_scopes(summary: &WriteSummary) -> BTreeSet<CacheScope> {
        summary
            .effects
            .iter()
            .flat_map(|effect| effect.affected_records())
            .flat_map(CacheScope::for_record)
            .collect()
    }

    /// Invalidate every affected scope, returning how many generations were dropped
    ///
    /// A cache failure is transient: the task is redelivered, the write resolves to
    /// unchanged, and invalidation runs again.
    pub async fn invalidate(&self, summary: &WriteSummary) -> Result<usize> {
        let scopes = Self::affected_scopes(summary);
        if scopes.is_empty() {
            return Ok(0);
        }

        tokio::time::timeout(self.timeout, async {
            for scope in &scopes {
                self.cache.delete(&self.keys.generation_key(scope)).await?;
            }
            Ok::<_, CatalogError>(())
        })
        .await
        .map_err(|_| CatalogError::timeout("cache invalidation", self.timeout))??;

        debug!(
            scopes = scopes.len(),
            provider = self.cache.provider_name(),
            "Invalidated cache scopes"
        );
        Ok(scopes.len())
    }
}
