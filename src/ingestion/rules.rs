//! # Business Rule Table
//!
//! Every content rule a structurally valid record must satisfy, as an explicit list of
//! `(rule, field, predicate)` entries. All entries are evaluated for every record and
//! each failure yields its own violation, so a record breaking three rules reports
//! three violations.

use std::collections::BTreeSet;

use crate::config::ValidationConfig;
use crate::models::Rule;

/// A record after structural checks, before it becomes a [`CatalogRecord`]
///
/// [`CatalogRecord`]: crate::models::CatalogRecord
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    /// Trimmed
    pub title: String,
    pub year: i64,
    /// Lowercased, trimmed, in payload order (duplicates kept)
    pub genre: Vec<String>,
    /// Trimmed names, in payload order
    pub cast: Vec<String>,
}

impl CandidateRecord {
    pub fn distinct_genres(&self) -> BTreeSet<&str> {
        self.genre.iter().map(String::as_str).collect()
    }
}

/// Rule parameters resolved for one validation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleContext {
    pub min_year: i64,
    pub max_year: i64,
    pub allowed_genres: BTreeSet<String>,
    pub max_title_length: usize,
    pub max_genres: usize,
    pub max_cast_size: usize,
}

impl RuleContext {
    /// Resolve configuration against the current calendar year
    pub fn from_config(config: &ValidationConfig, current_year: i32) -> Self {
        Self {
            min_year: i64::from(config.min_year),
            max_year: i64::from(current_year) + i64::from(config.max_year_offset),
            allowed_genres: config
                .allowed_genres
                .iter()
                .map(|g| g.trim().to_lowercase())
                .collect(),
            max_title_length: config.max_title_length,
            max_genres: config.max_genres,
            max_cast_size: config.max_cast_size,
        }
    }
}

/// Returns a failure detail, or `None` when the record satisfies the rule
pub type RuleCheck = fn(&CandidateRecord, &RuleContext) -> Option<String>;

#[derive(Clone, Copy)]
pub struct BusinessRule {
    pub rule: Rule,
    /// Field the violation is reported against
    pub field: &'static str,
    pub check: RuleCheck,
}

impl std::fmt::Debug for BusinessRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusinessRule")
            .field("rule", &self.rule)
            .field("field", &self.field)
            .finish()
    }
}

/// A failed rule for one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFailure {
    pub rule: Rule,
    pub field: &'static str,
    pub detail: String,
}

#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<BusinessRule>,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuleTable {
    /// The catalog's content rules
    pub fn standard() -> Self {
        Self {
            rules: vec![
                BusinessRule {
                    rule: Rule::TitleNonEmpty,
                    field: "title",
                    check: title_non_empty,
                },
                BusinessRule {
                    rule: Rule::TitleLength,
                    field: "title",
                    check: title_length,
                },
                BusinessRule {
                    rule: Rule::YearRange,
                    field: "year",
                    check: year_range,
                },
                BusinessRule {
                    rule: Rule::GenreCount,
                    field: "genre",
                    check: genre_count,
                },
                BusinessRule {
                    rule: Rule::GenreAllowed,
                    field: "genre",
                    check: genre_allowed,
                },
                BusinessRule {
                    rule: Rule::CastNonEmpty,
                    field: "cast",
                    check: cast_non_empty,
                },
                BusinessRule {
                    rule: Rule::CastSize,
                    field: "cast",
                    check: cast_size,
                },
            ],
        }
    }

    pub fn rules(&self) -> &[BusinessRule] {
        &self.rules
    }

    /// Evaluate every rule, in table order
    pub fn evaluate(&self, candidate: &CandidateRecord, ctx: &RuleContext) -> Vec<RuleFailure> {
        self.rules
            .iter()
            .filter_map(|entry| {
                (entry.check)(candidate, ctx).map(|detail| RuleFailure {
                    rule: entry.rule,
                    field: entry.field,
                    detail,
                })
            })
            .collect()
    }
}

fn title_non_empty(candidate: &CandidateRecord, _ctx: &RuleContext) -> Option<String> {
    candidate
        .title
        .is_empty()
        .then(|| "title must not be blank".to_string())
}

fn title_length(candidate: &CandidateRecord, ctx: &RuleContext) -> Option<String> {
    let length = candidate.title.chars().count();
    (length > ctx.max_title_length).then(|| {
        format!(
            "title is {length} characters, maximum is {}",
            ctx.max_title_length
        )
    })
}

fn year_range(candidate: &CandidateRecord, ctx: &RuleContext) -> Option<String> {
    let year = candidate.year;
    (year < ctx.min_year || year > ctx.max_year)
        .then(|| format!("{year} is outside {}..={}", ctx.min_year, ctx.max_year))
}

fn genre_count(candidate: &CandidateRecord, ctx: &RuleContext) -> Option<String> {
    let distinct = candidate.distinct_genres().len();
    (distinct == 0 || distinct > ctx.max_genres).then(|| {
        format!(
            "{distinct} distinct genres, expected 1..={}",
            ctx.max_genres
        )
    })
}

fn genre_allowed(candidate: &CandidateRecord, ctx: &RuleContext) -> Option<String> {
    let unknown: Vec<&str> = candidate
        .distinct_genres()
        .into_iter()
        .filter(|g| !ctx.allowed_genres.contains(*g))
        .collect();
    (!unknown.is_empty()).then(|| format!("genres not allowed: {}", unknown.join(", ")))
}

fn cast_non_empty(candidate: &CandidateRecord, _ctx: &RuleContext) -> Option<String> {
    if candidate.cast.is_empty() {
        return Some("cast must list at least one member".to_string());
    }
    let blank = candidate.cast.iter().filter(|m| m.is_empty()).count();
    (blank > 0).then(|| format!("{blank} cast member(s) have a blank name"))
}

fn cast_size(candidate: &CandidateRecord, ctx: &RuleContext) -> Option<String> {
    let size = candidate.cast.len();
    (size > ctx.max_cast_size)
        .then(|| format!("{size} cast members, maximum is {}", ctx.max_cast_size))
}
