//! # Query Service
//!
//! Cache-aside read path. For a query anchored to scope `S` with fingerprint `F`:
//!
//! 1. read the generation `G` of `S`, minting and storing a new one if absent
//! 2. look up `{S}:{G}:{F}`; a hit is returned as-is
//! 3. on a miss, query the store and cache the result under `{S}:{G}:{F}`
//!
//! Single-record lookups by natural key follow the same steps under the record's title
//! scope, with a key-derived fingerprint; an absent record is cached too.
//!
//! Writers delete `S`'s generation after committing. Because step 1 happens before the
//! store read, a result computed from pre-commit data is always filed under a generation
//! the writer has since dropped, and no later read can reach it.
//!
//! The cache never decides correctness: any cache error degrades that request to a
//! direct store read. Concurrent misses for one fingerprint each query the store.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{CacheKeys, CacheProvider, CacheScope, CacheService};
use crate::config::{CacheConfig, ConsumerConfig, QueryConfig};
use crate::database::{CatalogStore, StoreError};
use crate::error::{CatalogError, Result};
use crate::models::{CatalogQuery, CatalogRecord, NaturalKey, NormalizedQuery, QueryFingerprint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Hit,
    Miss,
    /// The cache was unusable for this request
    Bypass,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub records: Vec<CatalogRecord>,
    /// Matching records across all pages
    pub total: u64,
    pub cache_status: CacheStatus,
}

/// One page of results as stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPage {
    pub records: Vec<CatalogRecord>,
    pub total: u64,
}

impl From<&QueryResult> for CachedPage {
    fn from(result: &QueryResult) -> Self {
        Self {
            records: result.records.clone(),
            total: result.total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordLookup {
    pub record: Option<CatalogRecord>,
    pub cache_status: CacheStatus,
}

/// Timing and lifetime knobs for the read path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySettings {
    pub limits: QueryConfig,
    pub result_ttl: Duration,
    pub generation_ttl: Duration,
    pub cache_timeout: Duration,
}

impl QuerySettings {
    pub fn from_config(query: &QueryConfig, cache: &CacheConfig, consumer: &ConsumerConfig) -> Self {
        Self {
            limits: query.clone(),
            result_ttl: cache.result_ttl(),
            generation_ttl: cache.generation_ttl(),
            cache_timeout: consumer.cache_timeout(),
        }
    }
}

#[derive(Clone)]
pub struct QueryService<C: CacheService = CacheProvider> {
    store: Arc<dyn CatalogStore>,
    cache: C,
    keys: CacheKeys,
    settings: QuerySettings,
}

impl<C: CacheService> std::fmt::Debug for QueryService<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryService")
            .field("store", &self.store.backend_name())
            .field("cache", &self.cache.provider_name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl<C: CacheService> QueryService<C> {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        cache: C,
        keys: CacheKeys,
        settings: QuerySettings,
    ) -> Self {
        Self {
            store,
            cache,
            keys,
            settings,
        }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    pub fn limits(&self) -> &QueryConfig {
        &self.settings.limits
    }

    /// Records matching `query`, newest release first
    ///
    /// Fails with [`CatalogError::InvalidQuery`] for out-of-range limits or an empty
    /// year range, and with a store or timeout error when the store cannot answer.
    pub async fn lookup(&self, query: &CatalogQuery) -> Result<QueryResult> {
        let normalized = query.normalize(&self.settings.limits)?;
        self.lookup_normalized(&normalized).await
    }

    pub async fn lookup_normalized(&self, query: &NormalizedQuery) -> Result<QueryResult> {
        let scope = CacheScope::anchor_for(query);
        let fingerprint = query.fingerprint();
        let (page, cache_status) = self
            .cache_aside(&scope, &fingerprint, || self.query_store(query))
            .await?;
        debug!(
            scope = %scope,
            fingerprint = %fingerprint,
            records = page.records.len(),
            total = page.total,
            cache = ?cache_status,
            "Catalog query served"
        );
        Ok(QueryResult {
            records: page.records,
            total: page.total,
            cache_status,
        })
    }

    /// The record stored under `key`, if any
    pub async fn lookup_key(&self, key: &NaturalKey) -> Result<RecordLookup> {
        let scope = CacheScope::Title(key.title.to_lowercase());
        let fingerprint = QueryFingerprint::for_key(key);
        let (record, cache_status) = self
            .cache_aside(&scope, &fingerprint, || self.get_from_store(key))
            .await?;
        debug!(key = %key, found = record.is_some(), cache = ?cache_status, "Record lookup served");
        Ok(RecordLookup {
            record,
            cache_status,
        })
    }

    async fn cache_aside<T, F, Fut>(
        &self,
        scope: &CacheScope,
        fingerprint: &QueryFingerprint,
        load: F,
    ) -> Result<(T, CacheStatus)>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let Some(generation) = self.current_generation(scope).await else {
            return Ok((load().await?, CacheStatus::Bypass));
        };
        let entry_key = self.keys.entry_key(scope, &generation, fingerprint);

        if let Some(value) = self.cached(&entry_key).await {
            return Ok((value, CacheStatus::Hit));
        }

        let value = load().await?;
        self.populate(&entry_key, &value).await;
        Ok((value, CacheStatus::Miss))
    }

    /// Current generation of `scope`, minting one when absent; `None` bypasses the cache
    async fn current_generation(&self, scope: &CacheScope) -> Option<String> {
        let key = self.keys.generation_key(scope);
        match self.bounded(self.cache.get(&key)).await {
            Ok(Some(generation)) => Some(generation),
            Ok(None) => {
                let generation = Uuid::new_v4().simple().to_string();
                match self
                    .bounded(self.cache.set(&key, &generation, self.settings.generation_ttl))
                    .await
                {
                    Ok(()) => Some(generation),
                    Err(e) => {
                        warn!(key = %key, error = %e, "Failed to store cache generation");
                        None
                    }
                }
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache generation lookup failed, bypassing cache");
                None
            }
        }
    }

    async fn cached<T: DeserializeOwned>(&self, entry_key: &str) -> Option<T> {
        match self.bounded(self.cache.get(entry_key)).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = %entry_key, error = %e, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %entry_key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn populate<T: Serialize>(&self, entry_key: &str, value: &T) {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "Failed to encode query result for caching");
                return;
            }
        };
        if let Err(e) = self
            .bounded(self.cache.set(entry_key, &encoded, self.settings.result_ttl))
            .await
        {
            warn!(key = %entry_key, error = %e, "Failed to populate query cache");
        }
    }

    async fn query_store(&self, query: &NormalizedQuery) -> Result<CachedPage> {
        let timeout = self.settings.limits.store_timeout();
        let read = async {
            let records = self.store.query(query).await?;
            let total = self.store.count(query).await?;
            Ok::<_, StoreError>(CachedPage { records, total })
        };
        tokio::time::timeout(timeout, read)
            .await
            .map_err(|_| CatalogError::timeout("catalog query", timeout))?
            .map_err(CatalogError::from)
    }

    async fn get_from_store(&self, key: &NaturalKey) -> Result<Option<CatalogRecord>> {
        let timeout = self.settings.limits.store_timeout();
        tokio::time::timeout(timeout, self.store.get(key))
            .await
            .map_err(|_| CatalogError::timeout("catalog lookup", timeout))?
            .map_err(CatalogError::from)
    }

    async fn bounded<T>(
        &self,
        operation: impl std::future::Future<Output = crate::cache::CacheResult<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.settings.cache_timeout, operation)
            .await
            .map_err(|_| CatalogError::timeout("cache operation", self.settings.cache_timeout))?
            .map_err(CatalogError::from)
    }

    /// Store reachability, for health reporting
    pub async fn store_healthy(&self) -> bool {
        matches!(
            tokio::time::timeout(self.settings.limits.store_timeout(), self.store.health_check())
                .await,
            Ok(Ok(true))
        )
    }

    /// Cache reachability, for health reporting
    pub async fn cache_healthy(&self) -> bool {
        matches!(
            self.bounded(self.cache.health_check()).await,
            Ok(true)
        )
    }
}
