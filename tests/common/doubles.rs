#![allow(dead_code)]

//! Backends that can be switched into failure modes mid-test

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use catalog_core::cache::{CacheError, CacheProvider, CacheResult, CacheService};
use catalog_core::database::{
    CatalogStore, CatalogTransaction, InMemoryCatalogStore, StoreError, StoreResult,
};
use catalog_core::error::{CatalogError, Result};
use catalog_core::ingestion::{InMemoryNotificationSink, NotificationSink};
use catalog_core::models::{CatalogRecord, NaturalKey, NormalizedQuery, ObjectRef, RejectionRecord};
use catalog_core::objects::{
    FetchedObject, InMemoryObjectStore, ObjectStore, ObjectStoreError, ObjectStoreResult,
};

/// Take one from a countdown, reporting whether it was still running
fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Debug, Clone, Default)]
pub struct FlakyCatalogStore {
    inner: InMemoryCatalogStore,
    down: Arc<AtomicBool>,
    failing_begins: Arc<AtomicU32>,
}

impl FlakyCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryCatalogStore {
        &self.inner
    }

    /// Every operation fails while down
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// The next `count` transactions fail to open
    pub fn fail_next_begins(&self, count: u32) {
        self.failing_begins.store(count, Ordering::SeqCst);
    }

    fn check(&self, operation: &str) -> StoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(format!(
                "{operation}: connection refused"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for FlakyCatalogStore {
    async fn begin(&self) -> StoreResult<Box<dyn CatalogTransaction>> {
        self.check("begin")?;
        if take_one(&self.failing_begins) {
            return Err(StoreError::unavailable("begin: pool timed out"));
        }
        self.inner.begin().await
    }

    async fn query(&self, query: &NormalizedQuery) -> StoreResult<Vec<CatalogRecord>> {
        self.check("query")?;
        self.inner.query(query).await
    }

    async fn count(&self, query: &NormalizedQuery) -> StoreResult<u64> {
        self.check("count")?;
        self.inner.count(query).await
    }

    async fn get(&self, key: &NaturalKey) -> StoreResult<Option<CatalogRecord>> {
        self.check("get")?;
        self.inner.get(key).await
    }

    async fn health_check(&self) -> StoreResult<bool> {
        self.check("health_check")?;
        self.inner.health_check().await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

#[derive(Debug, Clone)]
pub struct FlakyCache {
    inner: CacheProvider,
    down: Arc<AtomicBool>,
}

impl Default for FlakyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FlakyCache {
    pub fn new() -> Self {
        Self {
            inner: CacheProvider::moka(10_000),
            down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn inner(&self) -> &CacheProvider {
        &self.inner
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> CacheResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(CacheError::ConnectionError("connection reset".to_string()));
        }
        Ok(())
    }
}

impl CacheService for FlakyCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn health_check(&self) -> CacheResult<bool> {
        self.check()?;
        self.inner.health_check().await
    }

    fn provider_name(&self) -> &'static str {
        "flaky"
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlakyObjectStore {
    inner: InMemoryObjectStore,
    failing_gets: Arc<AtomicU32>,
}

impl FlakyObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryObjectStore {
        &self.inner
    }

    /// The next `count` fetches fail transiently
    pub fn fail_next_gets(&self, count: u32) {
        self.failing_gets.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for FlakyObjectStore {
    async fn get(&self, object: &ObjectRef) -> ObjectStoreResult<FetchedObject> {
        if take_one(&self.failing_gets) {
            return Err(ObjectStoreError::unavailable("503 Slow Down"));
        }
        self.inner.get(object).await
    }

    async fn put(&self, object: &ObjectRef, bytes: Vec<u8>) -> ObjectStoreResult<()> {
        self.inner.put(object, bytes).await
    }

    async fn health_check(&self) -> ObjectStoreResult<bool> {
        self.inner.health_check().await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlakySink {
    inner: InMemoryNotificationSink,
    down: Arc<AtomicBool>,
}

impl FlakySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<RejectionRecord> {
        self.inner.published()
    }

    pub fn for_provider(&self, provider_id: &str) -> Vec<RejectionRecord> {
        self.inner.for_provider(provider_id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl NotificationSink for FlakySink {
    async fn publish(&self, rejection: &RejectionRecord) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(CatalogError::notification("provider topic unreachable"));
        }
        self.inner.publish(rejection).await
    }

    fn sink_name(&self) -> &'static str {
        "flaky"
    }
}
