//! # Cache Key Derivation
//!
//! Query results are cached under a *scope generation*. Every query anchors to exactly
//! one scope that all of its results must belong to; every record belongs to a fixed
//! set of scopes. Invalidation deletes the generation marker of each scope a written
//! record (old or new version) belongs to, which orphans every cached result under
//! those scopes at once without enumerating fingerprints.
//!
//! ```text
//! {prefix}:gen:{scope}                       -> generation id
//! {prefix}:q:{scope}:{generation}:{fingerprint} -> serialized result set
//! ```
//!
//! Anchor precedence: title, exact year, first genre, first cast member, provider,
//! then the catch-all scan scope.

use std::collections::BTreeSet;
use std::fmt;

use sha2::{Digest, Sha256};

use crate::models::{CatalogRecord, NormalizedQuery, QueryFingerprint};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheScope {
    /// Lowercased title
    Title(String),
    Year(i32),
    Genre(String),
    Cast(String),
    Provider(String),
    /// Queries with no anchorable filter; every write touches it
    Scan,
}

impl CacheScope {
    /// The single scope a query's results are confined to
    pub fn anchor_for(query: &NormalizedQuery) -> Self {
        if let Some(title) = &query.title {
            return CacheScope::Title(title.clone());
        }
        if let Some(year) = query.year.and_then(|y| y.exact()) {
            return CacheScope::Year(year);
        }
        if let Some(genre) = query.genre.first() {
            return CacheScope::Genre(genre.clone());
        }
        if let Some(member) = query.cast.first() {
            return CacheScope::Cast(member.clone());
        }
        if let Some(provider) = &query.provider_id {
            return CacheScope::Provider(provider.clone());
        }
        CacheScope::Scan
    }

    /// Every scope a query matching `record` could be anchored to
    pub fn for_record(record: &CatalogRecord) -> BTreeSet<CacheScope> {
        let mut scopes = BTreeSet::new();
        scopes.insert(CacheScope::Title(record.title.to_lowercase()));
        scopes.insert(CacheScope::Year(record.release_year));
        for genre in &record.genre {
            scopes.insert(CacheScope::Genre(genre.clone()));
        }
        for member in &record.cast {
            scopes.insert(CacheScope::Cast(member.clone()));
        }
        scopes.insert(CacheScope::Provider(record.provider_id.clone()));
        scopes.insert(CacheScope::Scan);
        scopes
    }

    /// Key-safe token; free-text values are hashed
    pub fn token(&self) -> String {
        match self {
            CacheScope::Title(t) => format!("title:{}", short_hash(t)),
            CacheScope::Year(y) => format!("year:{y}"),
            CacheScope::Genre(g) => format!("genre:{}", short_hash(g)),
            CacheScope::Cast(c) => format!("cast:{}", short_hash(c)),
            CacheScope::Provider(p) => format!("provider:{}", short_hash(p)),
            CacheScope::Scan => "scan".to_string(),
        }
    }
}

impl fmt::Display for CacheScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

fn short_hash(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(&digest[..8])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    prefix: String,
}

impl CacheKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn generation_key(&self, scope: &CacheScope) -> String {
        format!("{}:gen:{}", self.prefix, scope.token())
    }

    pub fn entry_key(
        &self,
        scope: &CacheScope,
        generation: &str,
        fingerprint: &QueryFingerprint,
    ) -> String {
        format!(
            "{}:q:{}:{}:{}",
            self.prefix,
            scope.token(),
            generation,
            fingerprint
        )
    }
}
