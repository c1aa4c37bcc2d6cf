//! # Ingestion Task
//!
//! A leased queue message resolved to the object(s) it announces. Message bodies arrive
//! in one of three envelopes:
//!
//! - direct: `{"objectKey": "...", "bucket": "..."}`
//! - storage event: `{"Records": [{"eventSource": "aws:s3", "s3": {...}}]}`
//! - wrapped notification: `{"Message": "<one of the above, JSON-encoded>"}`

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::messaging::{QueuedMessage, ReceiptHandle};

/// Provider used when an object key carries no provider segment
pub const UNKNOWN_PROVIDER: &str = "unknown";

const STORAGE_EVENT_SOURCE: &str = "aws:s3";

/// Location of an uploaded payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    pub bucket: String,
    pub object_key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, object_key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object_key: object_key.into(),
        }
    }

    /// Second `/` segment of the key: `uploads/<provider>/file.json`
    pub fn provider_id(&self) -> String {
        let mut segments = self.object_key.split('/');
        match (segments.next(), segments.next()) {
            (Some(_), Some(provider)) if !provider.is_empty() => provider.to_string(),
            _ => UNKNOWN_PROVIDER.to_string(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.object_key)
    }
}

/// One object to ingest, tied to the lease of the message that announced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionTask {
    pub object_ref: ObjectRef,
    pub receipt: ReceiptHandle,
    /// Receives of the carrying message, including the current one
    pub delivery_count: u32,
}

impl IngestionTask {
    pub fn provider_id(&self) -> String {
        self.object_ref.provider_id()
    }

    /// Expand a leased message into one task per announced object
    pub fn from_message(message: &QueuedMessage<Value>) -> Result<Vec<Self>, EnvelopeError> {
        let refs = decode_envelope(&message.message)?;
        Ok(refs
            .into_iter()
            .map(|object_ref| IngestionTask {
                object_ref,
                receipt: message.receipt_handle.clone(),
                delivery_count: message.receive_count,
            })
            .collect())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("message body is not a JSON object")]
    NotAnObject,

    #[error("missing or non-string field '{0}'")]
    MissingField(&'static str),

    #[error("wrapped notification is not valid JSON: {0}")]
    InvalidWrappedMessage(String),

    #[error("event carries no storage records")]
    NoRecords,

    #[error("unrecognized message envelope")]
    Unrecognized,
}

/// Resolve a message body to the objects it references
pub fn decode_envelope(body: &Value) -> Result<Vec<ObjectRef>, EnvelopeError> {
    decode_at_depth(body, 0)
}

fn decode_at_depth(body: &Value, depth: u8) -> Result<Vec<ObjectRef>, EnvelopeError> {
    let object = body.as_object().ok_or(EnvelopeError::NotAnObject)?;

    if let Some(records) = object.get("Records") {
        return decode_storage_records(records);
    }

    if object.contains_key("objectKey") {
        let key = string_field(object, "objectKey")?;
        let bucket = string_field(object, "bucket")?;
        return Ok(vec![ObjectRef::new(bucket, key)]);
    }

    // one level of wrapping only
    if let (Some(wrapped), 0) = (object.get("Message"), depth) {
        let raw = wrapped.as_str().ok_or(EnvelopeError::MissingField("Message"))?;
        let inner: Value = serde_json::from_str(raw)
            .map_err(|e| EnvelopeError::InvalidWrappedMessage(e.to_string()))?;
        return decode_at_depth(&inner, depth + 1);
    }

    Err(EnvelopeError::Unrecognized)
}

fn decode_storage_records(records: &Value) -> Result<Vec<ObjectRef>, EnvelopeError> {
    let records = records
        .as_array()
        .ok_or(EnvelopeError::MissingField("Records"))?;

    let mut refs = Vec::new();
    for record in records {
        if record.get("eventSource").and_then(Value::as_str) != Some(STORAGE_EVENT_SOURCE) {
            continue;
        }
        let bucket = record
            .pointer("/s3/bucket/name")
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::MissingField("s3.bucket.name"))?;
        let key = record
            .pointer("/s3/object/key")
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::MissingField("s3.object.key"))?;
        refs.push(ObjectRef::new(bucket, key));
    }

    if refs.is_empty() {
        return Err(EnvelopeError::NoRecords);
    }
    Ok(refs)
}

fn string_field<'a>(
    object: &'a serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, EnvelopeError> {
    object
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(EnvelopeError::MissingField(field))
}
