//! Payload fetcher: bounded-time reads from the object store

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{CatalogError, Result};
use crate::models::ObjectRef;
use crate::objects::{FetchedObject, ObjectStore};

#[derive(Clone)]
pub struct PayloadFetcher {
    store: Arc<dyn ObjectStore>,
    timeout: Duration,
}

impl std::fmt::Debug for PayloadFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadFetcher")
            .field("backend", &self.store.backend_name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl PayloadFetcher {
    pub fn new(store: Arc<dyn ObjectStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Read the raw bytes of an object
    ///
    /// A missing object surfaces as a permanent [`CatalogError::ObjectStore`]; an
    /// unreachable store or an elapsed timeout is transient.
    pub async fn fetch(&self, object: &ObjectRef) -> Result<FetchedObject> {
        let fetched = tokio::time::timeout(self.timeout, self.store.get(object))
            .await
            .map_err(|_| CatalogError::timeout(format!("fetch {object}"), self.timeout))??;

        debug!(
            object_ref = %object,
            bytes = fetched.bytes.len(),
            "Fetched payload"
        );
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::objects::{InMemoryObjectStore, ObjectStoreError, ObjectStoreResult};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct StalledStore;

    #[async_trait]
    impl ObjectStore for StalledStore {
        async fn get(&self, _object: &ObjectRef) -> ObjectStoreResult<FetchedObject> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(ObjectStoreError::unavailable("unreachable"))
        }

        async fn put(&self, _object: &ObjectRef, _bytes: Vec<u8>) -> ObjectStoreResult<()> {
            Ok(())
        }

        async fn health_check(&self) -> ObjectStoreResult<bool> {
            Ok(false)
        }

        fn backend_name(&self) -> &'static str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn test_fetch_existing_object() {
        let store = InMemoryObjectStore::new();
        let obj = ObjectRef::new("uploads", "uploads/acme/dune.json");
        store.put(&obj, b"{}".to_vec()).await.unwrap();

        let fetcher = PayloadFetcher::new(Arc::new(store), Duration::from_secs(1));
        assert_eq!(fetcher.fetch(&obj).await.unwrap().bytes, b"{}");
    }

    #[tokio::test]
    async fn test_missing_object_is_permanent() {
        let fetcher = PayloadFetcher::new(
            Arc::new(InMemoryObjectStore::new()),
            Duration::from_secs(1),
        );
        let err = fetcher
            .fetch(&ObjectRef::new("uploads", "uploads/acme/gone.json"))
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Permanent);
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_transient() {
        let fetcher = PayloadFetcher::new(Arc::new(StalledStore), Duration::from_millis(50));
        let err = fetcher
            .fetch(&ObjectRef::new("uploads", "uploads/acme/slow.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Timeout { .. }));
        assert!(err.is_transient());
    }
}
