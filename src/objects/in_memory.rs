//! In-memory object store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::errors::{ObjectStoreError, ObjectStoreResult};
use super::store::{FetchedObject, ObjectStore};
use crate::models::ObjectRef;

#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectStore {
    objects: Arc<RwLock<HashMap<ObjectRef, FetchedObject>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object with an explicit modification time
    pub fn put_at(&self, object: &ObjectRef, bytes: impl Into<Vec<u8>>, last_modified: DateTime<Utc>) {
        self.objects.write().insert(
            object.clone(),
            FetchedObject {
                bytes: bytes.into(),
                last_modified,
            },
        );
    }

    pub fn remove(&self, object: &ObjectRef) -> bool {
        self.objects.write().remove(object).is_some()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, object: &ObjectRef) -> ObjectStoreResult<FetchedObject> {
        self.objects
            .read()
            .get(object)
            .cloned()
            .ok_or_else(|| ObjectStoreError::not_found(object.to_string()))
    }

    async fn put(&self, object: &ObjectRef, bytes: Vec<u8>) -> ObjectStoreResult<()> {
        self.put_at(object, bytes, Utc::now());
        Ok(())
    }

    async fn health_check(&self) -> ObjectStoreResult<bool> {
        Ok(true)
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }
}
