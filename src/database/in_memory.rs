//! # In-Memory Catalog Store
//!
//! Transactional store for tests and local runs. A transaction holds the table lock for
//! its whole lifetime and stages writes privately; only `commit` publishes them.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::errors::{StoreError, StoreResult};
use super::store::{CatalogStore, CatalogTransaction};
use crate::models::{catalog_order, CatalogRecord, NaturalKey, NormalizedQuery};

type Table = BTreeMap<NaturalKey, CatalogRecord>;

#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalogStore {
    table: Arc<Mutex<Table>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every committed record, in key order
    pub async fn snapshot(&self) -> Vec<CatalogRecord> {
        self.table.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.lock().await.is_empty()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn begin(&self) -> StoreResult<Box<dyn CatalogTransaction>> {
        let guard = self.table.clone().lock_owned().await;
        Ok(Box::new(InMemoryTransaction {
            guard,
            staged: BTreeMap::new(),
        }))
    }

    async fn query(&self, query: &NormalizedQuery) -> StoreResult<Vec<CatalogRecord>> {
        let table = self.table.lock().await;
        let mut matches: Vec<CatalogRecord> = table
            .values()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        matches.sort_by(catalog_order);
        Ok(matches
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }

    async fn count(&self, query: &NormalizedQuery) -> StoreResult<u64> {
        let table = self.table.lock().await;
        Ok(table.values().filter(|record| query.matches(record)).count() as u64)
    }

    async fn get(&self, key: &NaturalKey) -> StoreResult<Option<CatalogRecord>> {
        Ok(self.table.lock().await.get(key).cloned())
    }

    async fn health_check(&self) -> StoreResult<bool> {
        Ok(true)
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }
}

pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Table>,
    staged: Table,
}

impl InMemoryTransaction {
    fn current(&self, key: &NaturalKey) -> Option<&CatalogRecord> {
        self.staged.get(key).or_else(|| self.guard.get(key))
    }
}

#[async_trait]
impl CatalogTransaction for InMemoryTransaction {
    async fn find_for_update(&mut self, key: &NaturalKey) -> StoreResult<Option<CatalogRecord>> {
        Ok(self.current(key).cloned())
    }

    async fn insert(&mut self, record: &CatalogRecord) -> StoreResult<()> {
        let key = record.natural_key();
        if self.current(&key).is_some() {
            return Err(StoreError::conflict(
                "insert",
                format!("duplicate natural key {key}"),
            ));
        }
        self.staged.insert(key, record.clone());
        Ok(())
    }

    async fn update(&mut self, record: &CatalogRecord) -> StoreResult<()> {
        let key = record.natural_key();
        if self.current(&key).is_none() {
            return Err(StoreError::conflict(
                "update",
                format!("row for {key} disappeared"),
            ));
        }
        self.staged.insert(key, record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryTransaction { mut guard, staged } = *self;
        guard.extend(staged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryConfig;
    use crate::models::CatalogQuery;
    use chrono::Utc;

    fn record(title: &str, year: i32) -> CatalogRecord {
        CatalogRecord::new(
            title,
            year,
            "acme",
            ["drama".to_string()].into(),
            vec!["Someone".to_string()],
            Utc::now(),
            "uploads/acme/x.json",
        )
        .with_version(1)
    }

    #[tokio::test]
    async fn test_commit_publishes_staged_writes() {
        let store = InMemoryCatalogStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert(&record("Heat", 1995)).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = InMemoryCatalogStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert(&record("Heat", 1995)).await.unwrap();
            assert!(tx
                .find_for_update(&record("Heat", 1995).natural_key())
                .await
                .unwrap()
                .is_some());
        }
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_insert_conflicts() {
        let store = InMemoryCatalogStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert(&record("Heat", 1995)).await.unwrap();
        let err = tx.insert(&record("Heat", 1995)).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_query_orders_and_paginates() {
        let store = InMemoryCatalogStore::new();
        let mut tx = store.begin().await.unwrap();
        for (title, year) in [("Alien", 1979), ("Heat", 1995), ("Arrival", 2016)] {
            tx.insert(&record(title, year)).await.unwrap();
        }
        tx.commit().await.unwrap();

        let page = CatalogQuery {
            limit: Some(2),
            offset: Some(1),
            ..Default::default()
        }
        .normalize(&QueryConfig::default())
        .unwrap();
        let titles: Vec<_> = store
            .query(&page)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["Heat", "Alien"]);
        assert_eq!(store.count(&page).await.unwrap(), 3);
    }
}
