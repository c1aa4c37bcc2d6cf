//! # Catalog Queries
//!
//! A read predicate over `{title, year, genre, cast, providerId}`. Filters combine with
//! AND. Title equality is case-insensitive, every listed genre and cast member must be
//! present, and `year` is either exact or an inclusive range.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{CatalogRecord, NaturalKey};
use crate::config::QueryConfig;
use crate::error::{CatalogError, Result};

/// Bumped whenever the normalized encoding changes, so old cache keys stop matching
const FINGERPRINT_VERSION: &str = "v2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum YearFilter {
    Exact(i32),
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<i32>,
    },
}

impl YearFilter {
    pub fn matches(&self, year: i32) -> bool {
        match *self {
            YearFilter::Exact(y) => y == year,
            YearFilter::Range { from, to } => {
                from.map_or(true, |f| year >= f) && to.map_or(true, |t| year <= t)
            }
        }
    }

    pub fn exact(&self) -> Option<i32> {
        match *self {
            YearFilter::Exact(y) => Some(y),
            YearFilter::Range { .. } => None,
        }
    }
}

/// Caller-supplied predicate, as received over the API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogQuery {
    pub title: Option<String>,
    pub year: Option<YearFilter>,
    pub genre: Vec<String>,
    pub cast: Vec<String>,
    pub provider_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl CatalogQuery {
    pub fn by_title_and_year(title: impl Into<String>, year: i32) -> Self {
        Self {
            title: Some(title.into()),
            year: Some(YearFilter::Exact(year)),
            ..Default::default()
        }
    }

    /// Canonicalize and bounds-check
    ///
    /// Equivalent predicates (different case, whitespace, list order, defaulted limit)
    /// normalize to the same value and therefore the same fingerprint.
    pub fn normalize(&self, config: &QueryConfig) -> Result<NormalizedQuery> {
        let limit = self.limit.unwrap_or(config.default_limit);
        if limit == 0 || limit > config.max_limit {
            return Err(CatalogError::invalid_query(format!(
                "limit must be between 1 and {}",
                config.max_limit
            )));
        }

        let year = match self.year {
            Some(YearFilter::Range {
                from: Some(f),
                to: Some(t),
            }) if f > t => {
                return Err(CatalogError::invalid_query(format!(
                    "year range is empty: {f} > {t}"
                )))
            }
            Some(YearFilter::Range {
                from: Some(f),
                to: Some(t),
            }) if f == t => Some(YearFilter::Exact(f)),
            Some(YearFilter::Range {
                from: None,
                to: None,
            }) => None,
            other => other,
        };

        Ok(NormalizedQuery {
            title: non_blank(self.title.as_deref()).map(|t| t.to_lowercase()),
            year,
            genre: normalized_list(&self.genre, true),
            cast: normalized_list(&self.cast, false),
            provider_id: non_blank(self.provider_id.as_deref()).map(str::to_string),
            limit,
            offset: self.offset.unwrap_or(0),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn normalized_list(values: &[String], lowercase: bool) -> Vec<String> {
    let mut list: Vec<String> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| if lowercase { v.to_lowercase() } else { v.to_string() })
        .collect();
    list.sort();
    list.dedup();
    list
}

/// Canonical predicate; the cache fingerprint is derived from this form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedQuery {
    /// Lowercased
    pub title: Option<String>,
    pub year: Option<YearFilter>,
    /// Lowercased, sorted, deduplicated
    pub genre: Vec<String>,
    /// Sorted, deduplicated
    pub cast: Vec<String>,
    pub provider_id: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

impl NormalizedQuery {
    pub fn matches(&self, record: &CatalogRecord) -> bool {
        if let Some(title) = &self.title {
            if record.title.to_lowercase() != *title {
                return false;
            }
        }
        if let Some(year) = &self.year {
            if !year.matches(record.release_year) {
                return false;
            }
        }
        if let Some(provider) = &self.provider_id {
            if record.provider_id != *provider {
                return false;
            }
        }
        self.genre.iter().all(|g| record.genre.contains(g))
            && self.cast.iter().all(|c| record.cast.contains(c))
    }

    pub fn fingerprint(&self) -> QueryFingerprint {
        // field order is fixed by the struct definition
        let encoded = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_VERSION.as_bytes());
        hasher.update(b":");
        hasher.update(encoded.as_bytes());
        QueryFingerprint(hex::encode(hasher.finalize()))
    }
}

/// Deterministic cache identity of a normalized query, stable across restarts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryFingerprint(pub String);

impl QueryFingerprint {
    /// Identity of a single-record lookup; distinct from every predicate fingerprint
    pub fn for_key(key: &NaturalKey) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_VERSION.as_bytes());
        hasher.update(b":key:");
        hasher.update(key.provider_id.as_bytes());
        hasher.update([0]);
        hasher.update(key.release_year.to_be_bytes());
        hasher.update([0]);
        hasher.update(key.title.as_bytes());
        QueryFingerprint(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueryFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
