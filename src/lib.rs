#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Catalog Core
//!
//! Ingestion pipeline and cache-aside read path for a movie catalog.
//!
//! ## Overview
//!
//! Content providers upload JSON payloads to an object store. A notification for each
//! upload lands on an at-least-once queue; a pool of workers leases each message,
//! fetches the payload, validates it record by record, writes accepted records with
//! last-writer-wins semantics, invalidates affected cache scopes, and reports rejected
//! records back to the provider. A separate read API answers catalog queries from a
//! result cache that falls back to the store.
//!
//! ## Guarantees
//!
//! - **Idempotent ingestion**: redelivering a message never changes the store
//! - **Deterministic conflicts**: two versions of a key converge on the same winner in
//!   any arrival order
//! - **No stale reads after a write**: results computed before a write can never be
//!   served after it
//! - **Ack discipline**: only terminal outcomes acknowledge; transient failures
//!   redeliver
//!
//! ## Module Organization
//!
//! - [`models`] - Records, tasks, envelopes, validation outcomes, queries
//! - [`ingestion`] - Consumer, processor, validator, writer, cache sync, dead-letter
//! - [`query`] - Cache-aside lookup service
//! - [`web`] - Axum read API
//! - [`messaging`] - Queue abstraction with in-memory and pgmq providers
//! - [`database`] - Catalog store abstraction with in-memory and PostgreSQL stores
//! - [`objects`] - Object store abstraction
//! - [`cache`] - Cache abstraction with moka, redis and no-op backends
//! - [`bootstrap`] - Backend wiring for the binaries
//! - [`config`] - Layered configuration
//! - [`error`] - Crate error type and retry classification
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use catalog_core::cache::{CacheKeys, CacheProvider};
//! use catalog_core::config::CatalogConfig;
//! use catalog_core::database::{CatalogStore, InMemoryCatalogStore};
//! use catalog_core::ingestion::{build_processor, InMemoryNotificationSink};
//! use catalog_core::objects::InMemoryObjectStore;
//! use catalog_core::query::{QueryService, QuerySettings};
//! use catalog_core::CatalogQuery;
//!
//! let config = CatalogConfig::default();
//! let store: Arc<dyn CatalogStore> = Arc::new(InMemoryCatalogStore::new());
//! let cache = CacheProvider::moka(config.cache.max_capacity);
//!
//! let processor = build_processor(
//!     &config,
//!     Arc::new(InMemoryObjectStore::new()),
//!     store.clone(),
//!     cache.clone(),
//!     Arc::new(InMemoryNotificationSink::new()),
//! );
//! let reader = QueryService::new(
//!     store,
//!     cache,
//!     CacheKeys::new(config.cache.key_prefix.clone()),
//!     QuerySettings::from_config(&config.query, &config.cache, &config.consumer),
//! );
//!
//! # tokio_test::block_on(async {
//! let result = reader.lookup(&CatalogQuery::by_title_and_year("Dune", 2021)).await?;
//! println!("{} records ({:?})", result.records.len(), result.cache_status);
//! # let _ = processor;
//! # Ok::<(), catalog_core::CatalogError>(())
//! # }).unwrap();
//! ```

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod ingestion;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod objects;
pub mod query;
pub mod web;

pub use config::{CatalogConfig, ConfigLoader};
pub use error::{CatalogError, ErrorClass, Result};
pub use ingestion::{QueueConsumer, TaskDisposition, TaskProcessor};
pub use models::{CatalogQuery, CatalogRecord, IngestionTask, NaturalKey, RejectionRecord};
pub use query::QueryService;
