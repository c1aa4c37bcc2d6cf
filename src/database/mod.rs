//! # Catalog Store
//!
//! Durable record storage behind the [`CatalogStore`] trait, with a PostgreSQL
//! implementation for deployments and an in-memory one for tests and local runs.

pub mod connection;
pub mod errors;
pub mod in_memory;
pub mod postgres;
pub mod store;

pub use connection::{create_pool, run_migrations};
pub use errors::{StoreError, StoreResult};
pub use in_memory::InMemoryCatalogStore;
pub use postgres::PgCatalogStore;
pub use store::{CatalogStore, CatalogTransaction};
