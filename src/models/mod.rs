//! # Domain Models
//!
//! Catalog records, ingestion tasks and their envelopes, validation outcomes, read
//! queries and rejection reports.

pub mod catalog_record;
pub mod ingestion_task;
pub mod query;
pub mod rejection;
pub mod validation;

pub use catalog_record::{catalog_order, CatalogRecord, NaturalKey, SourceChecksum};
pub use ingestion_task::{decode_envelope, EnvelopeError, IngestionTask, ObjectRef, UNKNOWN_PROVIDER};
pub use query::{CatalogQuery, NormalizedQuery, QueryFingerprint, YearFilter};
pub use rejection::RejectionRecord;
pub use validation::{Rule, ValidationOutcome, ValidationReport, Violation};
