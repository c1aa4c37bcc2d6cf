//! # Catalog Record
//!
//! The durable unit of the catalog, identified by its natural key
//! `(title, release_year, provider_id)`.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Unique identity of a record in the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NaturalKey {
    pub title: String,
    pub release_year: i32,
    pub provider_id: String,
}

impl NaturalKey {
    /// Key as ingestion stores it: the title trimmed, its case kept
    pub fn new(title: &str, release_year: i32, provider_id: impl Into<String>) -> Self {
        Self {
            title: title.trim().to_string(),
            release_year,
            provider_id: provider_id.into(),
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) [{}]", self.title, self.release_year, self.provider_id)
    }
}

/// SHA-256 over the canonical content of a record
///
/// Covers title, year, provider, the sorted genre set and the ordered cast. The
/// ingestion timestamp is excluded so a re-upload of identical content is a no-op.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceChecksum([u8; 32]);

impl SourceChecksum {
    pub fn compute(
        title: &str,
        release_year: i32,
        provider_id: &str,
        genre: &BTreeSet<String>,
        cast: &[String],
    ) -> Self {
        // serde_json::Map is ordered by key, so the encoding is canonical
        let canonical = serde_json::json!({
            "cast": cast,
            "genre": genre,
            "provider": provider_id,
            "title": title,
            "year": release_year,
        });
        let digest = Sha256::digest(canonical.to_string().as_bytes());
        Self(digest.into())
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for SourceChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceChecksum({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for SourceChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for SourceChecksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SourceChecksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let hex_str = String::deserialize(deserializer)?;
        let bytes = hex::decode(&hex_str).map_err(D::Error::custom)?;
        Self::from_slice(&bytes)
            .ok_or_else(|| D::Error::custom("checksum must be 32 bytes of hex"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRecord {
    pub title: String,
    pub release_year: i32,
    pub provider_id: String,
    pub genre: BTreeSet<String>,
    pub cast: Vec<String>,
    pub source_checksum: SourceChecksum,
    pub ingested_at: DateTime<Utc>,
    /// Assigned by the writer; 0 until the record has been stored
    pub version: i64,
    /// Object the stored content came from
    pub source_object: String,
}

impl CatalogRecord {
    /// Build an unversioned record and compute its checksum
    ///
    /// `ingested_at` is truncated to microseconds, the precision of the stored column, so a
    /// record compares the same before and after a round trip through the store.
    pub fn new(
        title: impl Into<String>,
        release_year: i32,
        provider_id: impl Into<String>,
        genre: BTreeSet<String>,
        cast: Vec<String>,
        ingested_at: DateTime<Utc>,
        source_object: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let provider_id = provider_id.into();
        let source_checksum =
            SourceChecksum::compute(&title, release_year, &provider_id, &genre, &cast);
        Self {
            title,
            release_year,
            provider_id,
            genre,
            cast,
            source_checksum,
            ingested_at: ingested_at.trunc_subsecs(6),
            version: 0,
            source_object: source_object.into(),
        }
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            title: self.title.clone(),
            release_year: self.release_year,
            provider_id: self.provider_id.clone(),
        }
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    /// Total order deciding which of two versions of a key wins
    ///
    /// Later `ingested_at` wins; equal timestamps fall back to the larger checksum so
    /// every worker reaches the same answer whatever the arrival order.
    pub fn freshness_cmp(&self, other: &CatalogRecord) -> Ordering {
        self.ingested_at
            .cmp(&other.ingested_at)
            .then_with(|| self.source_checksum.cmp(&other.source_checksum))
    }

    /// Same stored content, ignoring version and lineage
    pub fn same_content(&self, other: &CatalogRecord) -> bool {
        self.source_checksum == other.source_checksum
    }
}

/// Read-path ordering: newest release first, then title, then provider
pub fn catalog_order(a: &CatalogRecord, b: &CatalogRecord) -> Ordering {
    b.release_year
        .cmp(&a.release_year)
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.provider_id.cmp(&b.provider_id))
}
