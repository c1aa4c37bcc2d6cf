//! Filesystem object store
//!
//! Buckets are directories under a root; keys are relative paths inside them.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::errors::{ObjectStoreError, ObjectStoreResult};
use super::store::{FetchedObject, ObjectStore};
use crate::models::ObjectRef;

#[derive(Debug, Clone)]
pub struct FileSystemObjectStore {
    root: PathBuf,
}

impl FileSystemObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, object: &ObjectRef) -> ObjectStoreResult<PathBuf> {
        let mut path = self.root.clone();
        for (part, value) in [("bucket", &object.bucket), ("key", &object.object_key)] {
            let relative = Path::new(value.as_str());
            if value.is_empty()
                || relative
                    .components()
                    .any(|c| !matches!(c, Component::Normal(_)))
            {
                return Err(ObjectStoreError::invalid_key(
                    value.clone(),
                    format!("{part} must be a plain relative path"),
                ));
            }
            path.push(relative);
        }
        Ok(path)
    }
}

fn io_error(object: &ObjectRef, err: std::io::Error) -> ObjectStoreError {
    match err.kind() {
        ErrorKind::NotFound => ObjectStoreError::not_found(object.to_string()),
        _ => ObjectStoreError::unavailable(format!("{object}: {err}")),
    }
}

#[async_trait]
impl ObjectStore for FileSystemObjectStore {
    async fn get(&self, object: &ObjectRef) -> ObjectStoreResult<FetchedObject> {
        let path = self.path_for(object)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| io_error(object, e))?;
        let last_modified = tokio::fs::metadata(&path)
            .await
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .map_err(|e| io_error(object, e))?;

        debug!(path = %path.display(), size = bytes.len(), "Object read from filesystem");
        Ok(FetchedObject {
            bytes,
            last_modified,
        })
    }

    async fn put(&self, object: &ObjectRef, bytes: Vec<u8>) -> ObjectStoreResult<()> {
        let path = self.path_for(object)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(object, e))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| io_error(object, e))
    }

    async fn health_check(&self) -> ObjectStoreResult<bool> {
        Ok(tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
