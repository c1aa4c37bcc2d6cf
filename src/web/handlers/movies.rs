//! # Movie Lookup Handlers
//!
//! `GET /api/v1/movies` takes filters as query parameters (lists comma-separated);
//! `POST /api/v1/movies/search` takes a full [`CatalogQuery`] JSON body;
//! `GET /api/v1/movies/{provider}/{year}/{title}` fetches one record by natural key.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{CatalogQuery, CatalogRecord, NaturalKey, YearFilter};
use crate::query::CacheStatus;
use crate::web::errors::ApiError;
use crate::web::state::AppState;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MovieListParams {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    /// Comma-separated; every listed genre must match
    pub genre: Option<String>,
    /// Comma-separated; every listed member must match
    pub cast: Option<String>,
    pub provider_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl MovieListParams {
    pub fn into_query(self) -> Result<CatalogQuery, ApiError> {
        let year = match (self.year, self.year_from, self.year_to) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                return Err(ApiError::bad_request(
                    "year cannot be combined with yearFrom/yearTo",
                ))
            }
            (Some(year), None, None) => Some(YearFilter::Exact(year)),
            (None, None, None) => None,
            (None, from, to) => Some(YearFilter::Range { from, to }),
        };

        Ok(CatalogQuery {
            title: self.title,
            year,
            genre: split_list(self.genre),
            cast: split_list(self.cast),
            provider_id: self.provider_id,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.map(|value| value.split(',').map(str::to_string).collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
    /// Records on this page
    pub count: usize,
    /// Matching records across all pages
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieResponse {
    pub data: Vec<CatalogRecord>,
    pub pagination: Pagination,
    pub cache: CacheStatus,
}

/// List movies: GET /api/v1/movies
pub async fn list_movies(
    State(state): State<AppState>,
    Query(params): Query<MovieListParams>,
) -> Result<Json<MovieResponse>, ApiError> {
    let query = params.into_query()?;
    run_lookup(&state, &query).await
}

/// Search movies: POST /api/v1/movies/search
pub async fn search_movies(
    State(state): State<AppState>,
    Json(query): Json<CatalogQuery>,
) -> Result<Json<MovieResponse>, ApiError> {
    run_lookup(&state, &query).await
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordResponse {
    pub data: CatalogRecord,
    pub cache: CacheStatus,
}

/// One movie by natural key: GET /api/v1/movies/{provider}/{year}/{title}
pub async fn get_movie(
    State(state): State<AppState>,
    Path((provider_id, release_year, title)): Path<(String, i32, String)>,
) -> Result<Json<RecordResponse>, ApiError> {
    let key = NaturalKey::new(&title, release_year, provider_id);
    let lookup = state.query_service.lookup_key(&key).await?;
    match lookup.record {
        Some(record) => Ok(Json(RecordResponse {
            data: record,
            cache: lookup.cache_status,
        })),
        None => Err(ApiError::not_found(format!("movie {key}"))),
    }
}

async fn run_lookup(state: &AppState, query: &CatalogQuery) -> Result<Json<MovieResponse>, ApiError> {
    let service = &state.query_service;
    let normalized = query.normalize(service.limits())?;
    let result = service.lookup_normalized(&normalized).await?;

    debug!(
        records = result.records.len(),
        total = result.total,
        cache = ?result.cache_status,
        "Movie lookup served"
    );

    Ok(Json(MovieResponse {
        pagination: Pagination {
            limit: normalized.limit,
            offset: normalized.offset,
            count: result.records.len(),
            total: result.total,
        },
        data: result.records,
        cache: result.cache_status,
    }))
}
