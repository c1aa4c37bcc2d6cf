//! # PostgreSQL Catalog Store
//!
//! Rows live in `catalog_records` with a unique natural key. Writers lock the existing
//! row with `SELECT ... FOR UPDATE`; two writers inserting the same new key race on the
//! unique constraint and the loser gets a retryable [`StoreError::Conflict`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::debug;

use super::errors::{StoreError, StoreResult};
use super::store::{CatalogStore, CatalogTransaction};
use crate::models::{CatalogRecord, NaturalKey, NormalizedQuery, SourceChecksum, YearFilter};

const RECORD_COLUMNS: &str = "title, release_year, provider_id, genre, cast_members, \
                              source_checksum, ingested_at, version, source_object";

#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn record_from_row(row: &PgRow) -> StoreResult<CatalogRecord> {
    let title: String = row.try_get("title")?;
    let release_year: i32 = row.try_get("release_year")?;
    let provider_id: String = row.try_get("provider_id")?;
    let genre: Vec<String> = row.try_get("genre")?;
    let cast: Vec<String> = row.try_get("cast_members")?;
    let checksum: Vec<u8> = row.try_get("source_checksum")?;
    let ingested_at: DateTime<Utc> = row.try_get("ingested_at")?;
    let version: i64 = row.try_get("version")?;
    let source_object: String = row.try_get("source_object")?;

    let source_checksum = SourceChecksum::from_slice(&checksum).ok_or_else(|| {
        StoreError::corrupt_row(
            format!("{title} ({release_year}) [{provider_id}]"),
            format!("checksum has {} bytes, expected 32", checksum.len()),
        )
    })?;

    Ok(CatalogRecord {
        title,
        release_year,
        provider_id,
        genre: genre.into_iter().collect(),
        cast,
        source_checksum,
        ingested_at,
        version,
        source_object,
    })
}

/// WHERE clauses shared by the page query and its count
fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &NormalizedQuery) {
    if let Some(title) = &query.title {
        builder.push(" AND lower(title) = ").push_bind(title.clone());
    }
    match query.year {
        Some(YearFilter::Exact(year)) => {
            builder.push(" AND release_year = ").push_bind(year);
        }
        Some(YearFilter::Range { from, to }) => {
            if let Some(from) = from {
                builder.push(" AND release_year >= ").push_bind(from);
            }
            if let Some(to) = to {
                builder.push(" AND release_year <= ").push_bind(to);
            }
        }
        None => {}
    }
    if !query.genre.is_empty() {
        builder.push(" AND genre @> ").push_bind(query.genre.clone());
    }
    if !query.cast.is_empty() {
        builder.push(" AND cast_members @> ").push_bind(query.cast.clone());
    }
    if let Some(provider) = &query.provider_id {
        builder.push(" AND provider_id = ").push_bind(provider.clone());
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn begin(&self) -> StoreResult<Box<dyn CatalogTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgCatalogTransaction { tx }))
    }

    async fn query(&self, query: &NormalizedQuery) -> StoreResult<Vec<CatalogRecord>> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT {RECORD_COLUMNS} FROM catalog_records WHERE TRUE"
        ));
        push_filters(&mut builder, query);
        // byte order, matching catalog_order
        builder
            .push(" ORDER BY release_year DESC, title COLLATE \"C\" ASC, provider_id COLLATE \"C\" ASC LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(query.offset));

        let rows = builder.build().fetch_all(&self.pool).await?;
        debug!(rows = rows.len(), "Catalog query executed");
        rows.iter().map(record_from_row).collect()
    }

    async fn count(&self, query: &NormalizedQuery) -> StoreResult<u64> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT count(*) AS total FROM catalog_records WHERE TRUE");
        push_filters(&mut builder, query);
        let row = builder.build().fetch_one(&self.pool).await?;
        let total: i64 = row.try_get("total")?;
        Ok(total.max(0) as u64)
    }

    async fn get(&self, key: &NaturalKey) -> StoreResult<Option<CatalogRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM catalog_records \
             WHERE title = $1 AND release_year = $2 AND provider_id = $3"
        );
        let row = sqlx::query(&sql)
            .bind(&key.title)
            .bind(key.release_year)
            .bind(&key.provider_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn health_check(&self) -> StoreResult<bool> {
        let row = sqlx::query("SELECT 1 AS health").fetch_one(&self.pool).await?;
        let health: i32 = row.try_get("health")?;
        Ok(health == 1)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

pub struct PgCatalogTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CatalogTransaction for PgCatalogTransaction {
    async fn find_for_update(&mut self, key: &NaturalKey) -> StoreResult<Option<CatalogRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM catalog_records \
             WHERE title = $1 AND release_year = $2 AND provider_id = $3 FOR UPDATE"
        );
        let row = sqlx::query(&sql)
            .bind(&key.title)
            .bind(key.release_year)
            .bind(&key.provider_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn insert(&mut self, record: &CatalogRecord) -> StoreResult<()> {
        let genre: Vec<String> = record.genre.iter().cloned().collect();
        sqlx::query(
            "INSERT INTO catalog_records \
             (title, release_year, provider_id, genre, cast_members, source_checksum, \
              ingested_at, version, source_object, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())",
        )
        .bind(&record.title)
        .bind(record.release_year)
        .bind(&record.provider_id)
        .bind(&genre)
        .bind(&record.cast)
        .bind(record.source_checksum.as_bytes())
        .bind(record.ingested_at)
        .bind(record.version)
        .bind(&record.source_object)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update(&mut self, record: &CatalogRecord) -> StoreResult<()> {
        let genre: Vec<String> = record.genre.iter().cloned().collect();
        let result = sqlx::query(
            "UPDATE catalog_records SET \
             genre = $4, cast_members = $5, source_checksum = $6, ingested_at = $7, \
             version = $8, source_object = $9, updated_at = now() \
             WHERE title = $1 AND release_year = $2 AND provider_id = $3",
        )
        .bind(&record.title)
        .bind(record.release_year)
        .bind(&record.provider_id)
        .bind(&genre)
        .bind(&record.cast)
        .bind(record.source_checksum.as_bytes())
        .bind(record.ingested_at)
        .bind(record.version)
        .bind(&record.source_object)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::conflict(
                "update",
                format!("row for {} disappeared", record.natural_key()),
            ));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
