//! # Idempotent Writer
//!
//! Applies accepted records in one store transaction per task. For each record the
//! existing row (if any) is locked and compared:
//!
//! | existing row                     | action                                  |
//! |----------------------------------|-----------------------------------------|
//! | absent                           | insert, `version = 1`                   |
//! | same checksum                    | no-op                                   |
//! | incoming is fresher              | overwrite, `version = previous + 1`     |
//! | incoming is older                | skip; the stored row is already newer   |
//!
//! "Fresher" is [`CatalogRecord::freshness_cmp`]: later `ingested_at`, then the larger
//! checksum. Redelivering a task therefore never changes the store, and two versions of
//! a key converge on the same winner whatever their arrival order.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::database::CatalogStore;
use crate::error::{CatalogError, Result};
use crate::models::{CatalogRecord, NaturalKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    Inserted,
    Updated,
    /// Identical content already stored
    Unchanged,
    /// A fresher version is already stored
    Stale,
}

/// Decision for one incoming record against the stored row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteDecision {
    Insert(CatalogRecord),
    Update(CatalogRecord),
    Unchanged,
    Stale,
}

/// Pure last-writer-wins resolution; the returned record carries its new version
pub fn resolve(incoming: &CatalogRecord, existing: Option<&CatalogRecord>) -> WriteDecision {
    match existing {
        None => WriteDecision::Insert(incoming.clone().with_version(1)),
        Some(current) if current.same_content(incoming) => WriteDecision::Unchanged,
        Some(current) => match incoming.freshness_cmp(current) {
            Ordering::Greater => {
                WriteDecision::Update(incoming.clone().with_version(current.version + 1))
            }
            _ => WriteDecision::Stale,
        },
    }
}

/// What one record did to the store
#[derive(Debug, Clone, PartialEq)]
pub struct WriteEffect {
    pub key: NaturalKey,
    pub action: WriteAction,
    /// Row for the key after the transaction
    pub stored: CatalogRecord,
    /// Row for the key before the transaction
    pub previous: Option<CatalogRecord>,
}

impl WriteEffect {
    /// Records whose cached projections may be affected by this write
    ///
    /// Stale writes touch nothing. Unchanged writes still report the stored row so that
    /// a redelivery after a crash between commit and invalidation repeats the
    /// invalidation.
    pub fn affected_records(&self) -> Vec<&CatalogRecord> {
        match self.action {
            WriteAction::Stale => Vec::new(),
            _ => std::iter::once(&self.stored)
                .chain(self.previous.iter())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteSummary {
    pub effects: Vec<WriteEffect>,
}

impl WriteSummary {
    pub fn count(&self, action: WriteAction) -> usize {
        self.effects.iter().filter(|e| e.action == action).count()
    }

    /// Whether any row changed
    pub fn changed(&self) -> bool {
        self.effects
            .iter()
            .any(|e| matches!(e.action, WriteAction::Inserted | WriteAction::Updated))
    }
}

#[derive(Clone)]
pub struct IdempotentWriter {
    store: Arc<dyn CatalogStore>,
    timeout: Duration,
}

impl std::fmt::Debug for IdempotentWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotentWriter")
            .field("backend", &self.store.backend_name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl IdempotentWriter {
    pub fn new(store: Arc<dyn CatalogStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Apply `records` atomically
    ///
    /// Any store failure or an elapsed timeout aborts the whole transaction and is
    /// transient; nothing from this call is visible in that case.
    pub async fn write(&self, records: &[CatalogRecord]) -> Result<WriteSummary> {
        if records.is_empty() {
            return Ok(WriteSummary::default());
        }

        let summary = tokio::time::timeout(self.timeout, self.write_in_transaction(records))
            .await
            .map_err(|_| CatalogError::timeout("catalog write", self.timeout))??;

        info!(
            records = records.len(),
            inserted = summary.count(WriteAction::Inserted),
            updated = summary.count(WriteAction::Updated),
            unchanged = summary.count(WriteAction::Unchanged),
            stale = summary.count(WriteAction::Stale),
            "Catalog write committed"
        );
        Ok(summary)
    }

    async fn write_in_transaction(&self, records: &[CatalogRecord]) -> Result<WriteSummary> {
        let mut tx = self.store.begin().await?;
        let mut summary = WriteSummary::default();

        for incoming in records {
            let key = incoming.natural_key();
            let existing = tx.find_for_update(&key).await?;

            let (action, stored) = match resolve(incoming, existing.as_ref()) {
                WriteDecision::Insert(record) => {
                    tx.insert(&record).await?;
                    (WriteAction::Inserted, record)
                }
                WriteDecision::Update(record) => {
                    tx.update(&record).await?;
                    (WriteAction::Updated, record)
                }
                WriteDecision::Unchanged => match existing.clone() {
                    Some(current) => (WriteAction::Unchanged, current),
                    None => return Err(CatalogError::internal("unchanged write without a row")),
                },
                WriteDecision::Stale => match existing.clone() {
                    Some(current) => (WriteAction::Stale, current),
                    None => return Err(CatalogError::internal("stale write without a row")),
                },
            };

            debug!(key = %key, action = ?action, version = stored.version, "Resolved record");
            summary.effects.push(WriteEffect {
                key,
                action,
                stored,
                previous: existing,
            });
        }

        tx.commit().await?;
        Ok(summary)
    }
}
