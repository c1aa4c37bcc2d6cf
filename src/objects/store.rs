//! Object store trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::errors::ObjectStoreResult;
use crate::models::ObjectRef;

/// Raw payload plus the store's modification time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedObject {
    pub bytes: Vec<u8>,
    pub last_modified: DateTime<Utc>,
}

/// Byte payloads addressed by bucket and key
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn get(&self, object: &ObjectRef) -> ObjectStoreResult<FetchedObject>;

    async fn put(&self, object: &ObjectRef, bytes: Vec<u8>) -> ObjectStoreResult<()>;

    async fn health_check(&self) -> ObjectStoreResult<bool>;

    fn backend_name(&self) -> &'static str;
}
