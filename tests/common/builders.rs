#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use catalog_core::models::ObjectRef;

pub const UPLOAD_BUCKET: &str = "catalog-uploads";

/// Object reference following the `uploads/<provider>/<file>` layout
pub fn upload_ref(provider: &str, file: &str) -> ObjectRef {
    ObjectRef::new(UPLOAD_BUCKET, format!("uploads/{provider}/{file}"))
}

/// A fixed point in time, offset by whole minutes
pub fn at_minute(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + chrono::Duration::minutes(minute)
}

pub fn movie(title: &str, year: i64, genre: &[&str], cast: &[&str]) -> Value {
    json!({
        "title": title,
        "year": year,
        "genre": genre,
        "cast": cast,
    })
}

pub fn movie_updated_at(
    title: &str,
    year: i64,
    genre: &[&str],
    cast: &[&str],
    updated_at: DateTime<Utc>,
) -> Value {
    let mut value = movie(title, year, genre, cast);
    value["updatedAt"] = Value::String(updated_at.to_rfc3339());
    value
}

pub fn dune() -> Value {
    movie("Dune", 2021, &["sci-fi"], &["Timothée Chalamet"])
}

pub fn heat() -> Value {
    movie("Heat", 1995, &["crime", "thriller"], &["Al Pacino", "Robert De Niro"])
}

/// Direct task envelope
pub fn direct_envelope(object: &ObjectRef) -> Value {
    json!({
        "objectKey": object.object_key,
        "bucket": object.bucket,
    })
}

/// Storage event envelope announcing several objects
pub fn storage_event_envelope(objects: &[ObjectRef]) -> Value {
    let records: Vec<Value> = objects
        .iter()
        .map(|object| {
            json!({
                "eventSource": "aws:s3",
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": {"name": object.bucket},
                    "object": {"key": object.object_key},
                },
            })
        })
        .collect();
    json!({ "Records": records })
}

/// Storage event wrapped in a pub/sub notification
pub fn wrapped_envelope(inner: &Value) -> Value {
    json!({
        "Type": "Notification",
        "MessageId": "3f1c7a52-0000-4000-8000-000000000001",
        "Message": inner.to_string(),
    })
}
