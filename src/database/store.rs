//! # Catalog Store Traits
//!
//! The relational store is the sole durable owner of catalog state. Writes happen inside
//! a [`CatalogTransaction`]: dropping a transaction without calling `commit` discards
//! every staged change.

use async_trait::async_trait;

use super::errors::StoreResult;
use crate::models::{CatalogRecord, NaturalKey, NormalizedQuery};

#[async_trait]
pub trait CatalogStore: Send + Sync + 'static {
    async fn begin(&self) -> StoreResult<Box<dyn CatalogTransaction>>;

    /// Records matching `query`, in catalog order, paginated
    async fn query(&self, query: &NormalizedQuery) -> StoreResult<Vec<CatalogRecord>>;

    /// Number of records matching `query`, ignoring `limit` and `offset`
    async fn count(&self, query: &NormalizedQuery) -> StoreResult<u64>;

    async fn get(&self, key: &NaturalKey) -> StoreResult<Option<CatalogRecord>>;

    async fn health_check(&self) -> StoreResult<bool>;

    fn backend_name(&self) -> &'static str;
}

#[async_trait]
pub trait CatalogTransaction: Send {
    /// Read the current row for `key`, locking it until the transaction ends
    async fn find_for_update(&mut self, key: &NaturalKey) -> StoreResult<Option<CatalogRecord>>;

    async fn insert(&mut self, record: &CatalogRecord) -> StoreResult<()>;

    /// Overwrite the row with the same natural key
    async fn update(&mut self, record: &CatalogRecord) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
