//! # Validation Outcome Types
//!
//! Validation failures are data, not errors: the validator returns a
//! [`ValidationReport`] whose accepted and rejected halves are disjoint.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::CatalogRecord;

/// Named check that produced a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rule {
    /// Payload is not well-formed JSON
    MalformedPayload,
    /// Payload is neither an object nor an array of objects
    PayloadShape,
    /// Payload array holds no records
    EmptyPayload,
    RequiredField,
    FieldType,
    YearRange,
    GenreAllowed,
    GenreCount,
    CastNonEmpty,
    CastSize,
    TitleNonEmpty,
    TitleLength,
    /// Referenced object does not exist
    ObjectMissing,
    /// Queue message body could not be decoded
    MessageEnvelope,
    /// Transient failures persisted through the redrive threshold
    DeliveryExhausted,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::MalformedPayload => "malformed-payload",
            Rule::PayloadShape => "payload-shape",
            Rule::EmptyPayload => "empty-payload",
            Rule::RequiredField => "required-field",
            Rule::FieldType => "field-type",
            Rule::YearRange => "year-range",
            Rule::GenreAllowed => "genre-allowed",
            Rule::GenreCount => "genre-count",
            Rule::CastNonEmpty => "cast-non-empty",
            Rule::CastSize => "cast-size",
            Rule::TitleNonEmpty => "title-non-empty",
            Rule::TitleLength => "title-length",
            Rule::ObjectMissing => "object-missing",
            Rule::MessageEnvelope => "message-envelope",
            Rule::DeliveryExhausted => "delivery-exhausted",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Path of the offending field, `[i].field` inside array payloads
    pub field: String,
    pub rule: Rule,
    pub detail: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, rule: Rule, detail: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            rule,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.field, self.detail, self.rule)
    }
}

/// Classification of one record set: exactly one side, never both
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Accepted(Vec<CatalogRecord>),
    Rejected(Vec<Violation>),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted(_))
    }
}

/// Result of validating one payload
///
/// Multi-record payloads split into an accepted subset and a parallel rejected list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub accepted: Vec<CatalogRecord>,
    pub rejected: Vec<Violation>,
    /// Records found in the payload, valid or not
    pub record_count: usize,
}

impl ValidationReport {
    /// Whole-payload rejection (parse or shape failure)
    pub fn rejected(violations: Vec<Violation>) -> Self {
        Self {
            accepted: Vec::new(),
            rejected: violations,
            record_count: 0,
        }
    }

    pub fn accepted_outcome(&self) -> Option<ValidationOutcome> {
        (!self.accepted.is_empty()).then(|| ValidationOutcome::Accepted(self.accepted.clone()))
    }

    pub fn rejected_outcome(&self) -> Option<ValidationOutcome> {
        (!self.rejected.is_empty()).then(|| ValidationOutcome::Rejected(self.rejected.clone()))
    }

    /// Non-empty outcomes, accepted first
    pub fn outcomes(&self) -> Vec<ValidationOutcome> {
        self.accepted_outcome()
            .into_iter()
            .chain(self.rejected_outcome())
            .collect()
    }

    pub fn is_fully_accepted(&self) -> bool {
        self.rejected.is_empty() && !self.accepted.is_empty()
    }

    /// Rules that fired, deduplicated and sorted
    pub fn rules(&self) -> Vec<Rule> {
        let mut rules: Vec<Rule> = self.rejected.iter().map(|v| v.rule).collect();
        rules.sort();
        rules.dedup();
        rules
    }
}
