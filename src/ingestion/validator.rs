//! # Record Validator
//!
//! Turns raw payload bytes into a [`ValidationReport`]. Checks run in three stages and
//! each stage short-circuits the next:
//!
//! 1. **Parse**: the bytes must be a JSON object or a non-empty array of objects
//! 2. **Structure**: `title`, `year`, `genre`, `cast` present with the right types;
//!    every structural violation of a record is collected
//! 3. **Content**: the [`RuleTable`] runs on records that passed stage 2
//!
//! Records in an array are judged independently: the valid ones are accepted, the
//! invalid ones contribute their violations to the rejected list. Field paths are bare
//! (`year`) for a single-object payload and indexed (`[2].year`) for arrays.

use chrono::{DateTime, Datelike, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use super::rules::{CandidateRecord, RuleContext, RuleTable};
use crate::config::ValidationConfig;
use crate::models::{CatalogRecord, Rule, ValidationReport, Violation};

/// Where the payload came from, stamped onto every accepted record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSource {
    pub provider_id: String,
    pub source_object: String,
    /// Used when a record carries no `updatedAt` of its own
    pub fallback_ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RecordValidator {
    config: ValidationConfig,
    table: RuleTable,
}

impl RecordValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            config,
            table: RuleTable::standard(),
        }
    }

    pub fn rule_table(&self) -> &RuleTable {
        &self.table
    }

    /// Validate against the current calendar year
    pub fn validate(&self, bytes: &[u8], source: &RecordSource) -> ValidationReport {
        self.validate_at(bytes, source, Utc::now().year())
    }

    /// Validate with an explicit current year for the year-range ceiling
    pub fn validate_at(
        &self,
        bytes: &[u8],
        source: &RecordSource,
        current_year: i32,
    ) -> ValidationReport {
        let payload: Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(e) => {
                return ValidationReport::rejected(vec![Violation::new(
                    "$",
                    Rule::MalformedPayload,
                    e.to_string(),
                )])
            }
        };

        let ctx = RuleContext::from_config(&self.config, current_year);

        let report = match payload {
            Value::Object(object) => {
                let mut report = ValidationReport {
                    record_count: 1,
                    ..Default::default()
                };
                self.judge_record(&object, &FieldPath::Root, source, &ctx, &mut report);
                report
            }
            Value::Array(items) if items.is_empty() => ValidationReport::rejected(vec![
                Violation::new("$", Rule::EmptyPayload, "payload array holds no records"),
            ]),
            Value::Array(items) => {
                let mut report = ValidationReport {
                    record_count: items.len(),
                    ..Default::default()
                };
                for (index, item) in items.iter().enumerate() {
                    let path = FieldPath::Indexed(index);
                    match item.as_object() {
                        Some(object) => {
                            self.judge_record(object, &path, source, &ctx, &mut report)
                        }
                        None => report.rejected.push(Violation::new(
                            path.root(),
                            Rule::PayloadShape,
                            format!("expected a movie object, found {}", json_type(item)),
                        )),
                    }
                }
                report
            }
            other => ValidationReport::rejected(vec![Violation::new(
                "$",
                Rule::PayloadShape,
                format!(
                    "expected a movie object or an array of them, found {}",
                    json_type(&other)
                ),
            )]),
        };

        debug!(
            source_object = %source.source_object,
            records = report.record_count,
            accepted = report.accepted.len(),
            violations = report.rejected.len(),
            "Validated payload"
        );
        report
    }

    fn judge_record(
        &self,
        object: &Map<String, Value>,
        path: &FieldPath,
        source: &RecordSource,
        ctx: &RuleContext,
        report: &mut ValidationReport,
    ) {
        let (candidate, updated_at) = match parse_structure(object, path) {
            Ok(parsed) => parsed,
            Err(violations) => {
                report.rejected.extend(violations);
                return;
            }
        };

        let failures = self.table.evaluate(&candidate, ctx);
        if !failures.is_empty() {
            report.rejected.extend(
                failures
                    .into_iter()
                    .map(|f| Violation::new(path.field(f.field), f.rule, f.detail)),
            );
            return;
        }

        // year passed the range rule, so it fits in i32
        let Ok(year) = i32::try_from(candidate.year) else {
            report.rejected.push(Violation::new(
                path.field("year"),
                Rule::YearRange,
                format!("{} does not fit a calendar year", candidate.year),
            ));
            return;
        };

        report.accepted.push(CatalogRecord::new(
            candidate.title,
            year,
            source.provider_id.clone(),
            candidate.genre.into_iter().collect(),
            candidate.cast,
            updated_at.unwrap_or(source.fallback_ingested_at),
            source.source_object.clone(),
        ));
    }
}

enum FieldPath {
    Root,
    Indexed(usize),
}

impl FieldPath {
    fn root(&self) -> String {
        match self {
            FieldPath::Root => "$".to_string(),
            FieldPath::Indexed(i) => format!("[{i}]"),
        }
    }

    fn field(&self, name: &str) -> String {
        match self {
            FieldPath::Root => name.to_string(),
            FieldPath::Indexed(i) => format!("[{i}].{name}"),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

type Structured = (CandidateRecord, Option<DateTime<Utc>>);

/// Presence and type checks; collects every structural violation of one record
fn parse_structure(
    object: &Map<String, Value>,
    path: &FieldPath,
) -> Result<Structured, Vec<Violation>> {
    let mut violations = Vec::new();

    let title = match required(object, "title", path, &mut violations) {
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(other) => {
            violations.push(type_violation(path.field("title"), "a string", other));
            None
        }
        None => None,
    };

    let year = match required(object, "year", path, &mut violations) {
        Some(value) => match value.as_i64() {
            Some(year) => Some(year),
            None => {
                violations.push(type_violation(path.field("year"), "an integer", value));
                None
            }
        },
        None => None,
    };

    let genre = match required(object, "genre", path, &mut violations) {
        Some(Value::Array(items)) => {
            let mut genres = Vec::with_capacity(items.len());
            for (j, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(g) => genres.push(g.trim().to_lowercase()),
                    None => violations.push(type_violation(
                        path.field(&format!("genre[{j}]")),
                        "a string",
                        item,
                    )),
                }
            }
            Some(genres)
        }
        Some(other) => {
            violations.push(type_violation(
                path.field("genre"),
                "an array of strings",
                other,
            ));
            None
        }
        None => None,
    };

    let cast = match required(object, "cast", path, &mut violations) {
        Some(Value::Array(items)) => {
            let mut members = Vec::with_capacity(items.len());
            for (j, item) in items.iter().enumerate() {
                match cast_name(item) {
                    Some(name) => members.push(name.trim().to_string()),
                    None => violations.push(type_violation(
                        path.field(&format!("cast[{j}]")),
                        "a name string or an object with a name",
                        item,
                    )),
                }
            }
            Some(members)
        }
        Some(other) => {
            violations.push(type_violation(
                path.field("cast"),
                "an array of names",
                other,
            ));
            None
        }
        None => None,
    };

    let updated_at = match object.get("updatedAt") {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                violations.push(Violation::new(
                    path.field("updatedAt"),
                    Rule::FieldType,
                    format!("expected an RFC 3339 timestamp: {e}"),
                ));
                None
            }
        },
        Some(other) => {
            violations.push(type_violation(
                path.field("updatedAt"),
                "an RFC 3339 timestamp",
                other,
            ));
            None
        }
    };

    match (title, year, genre, cast) {
        (Some(title), Some(year), Some(genre), Some(cast)) if violations.is_empty() => Ok((
            CandidateRecord {
                title,
                year,
                genre,
                cast,
            },
            updated_at,
        )),
        _ => Err(violations),
    }
}

fn required<'a>(
    object: &'a Map<String, Value>,
    name: &str,
    path: &FieldPath,
    violations: &mut Vec<Violation>,
) -> Option<&'a Value> {
    match object.get(name) {
        Some(Value::Null) | None => {
            violations.push(Violation::new(
                path.field(name),
                Rule::RequiredField,
                format!("missing required field '{name}'"),
            ));
            None
        }
        Some(value) => Some(value),
    }
}

fn type_violation(field: String, expected: &str, found: &Value) -> Violation {
    Violation::new(
        field,
        Rule::FieldType,
        format!("expected {expected}, found {}", json_type(found)),
    )
}

fn cast_name(item: &Value) -> Option<&str> {
    match item {
        Value::String(name) => Some(name),
        Value::Object(member) => member.get("name").and_then(Value::as_str),
        _ => None,
    }
}
