//! End-to-end ingestion through the consumer with in-memory backends

mod common;

use common::*;
use serde_json::json;

use catalog_core::ingestion::{MessageDisposition, TaskDisposition, WriteAction};
use catalog_core::models::{CatalogQuery, Rule, UNKNOWN_PROVIDER};
use catalog_core::query::CacheStatus;

#[tokio::test]
async fn test_single_movie_end_to_end() {
    let pipeline = Pipeline::new().await;
    let object = upload_ref("acme", "dune.json");
    let query = CatalogQuery::by_title_and_year("Dune", 2021);

    let before = pipeline.read(&query).await;
    assert!(before.records.is_empty());
    assert_eq!(before.cache_status, CacheStatus::Miss);
    assert_eq!(pipeline.read(&query).await.cache_status, CacheStatus::Hit);

    let disposition = pipeline.ingest(&object, &dune()).await;
    assert_eq!(disposition, Some(MessageDisposition::Acknowledged));
    assert_eq!(pipeline.pending().await, 0);
    assert!(pipeline.sink.is_empty());

    let stored = pipeline
        .stored_record("Dune", 2021, "acme")
        .await
        .expect("record should be stored");
    assert_eq!(stored.version, 1);
    assert_eq!(stored.genre.iter().collect::<Vec<_>>(), vec!["sci-fi"]);
    assert_eq!(stored.cast, vec!["Timothée Chalamet".to_string()]);
    assert_eq!(stored.source_object, object.to_string());

    // the empty pre-write result is unreachable now
    let after = pipeline.read(&query).await;
    assert_eq!(after.cache_status, CacheStatus::Miss);
    assert_eq!(after.records, vec![stored.clone()]);

    let again = pipeline.read(&query).await;
    assert_eq!(again.cache_status, CacheStatus::Hit);
    assert_eq!(again.records, vec![stored]);
}

#[tokio::test]
async fn test_redelivery_leaves_store_unchanged() {
    let pipeline = Pipeline::new().await;
    let object = upload_ref("acme", "heat.json");
    pipeline.upload(&object, &heat());

    pipeline.enqueue_object(&object).await;
    pipeline.drain().await;
    let first = pipeline.stored().await;
    assert_eq!(first.len(), 1);

    for _ in 0..3 {
        pipeline.enqueue_object(&object).await;
    }
    let dispositions = pipeline.drain().await;
    assert_eq!(dispositions, vec![MessageDisposition::Acknowledged; 3]);

    assert_eq!(pipeline.stored().await, first);
    assert_eq!(first[0].version, 1);
}

#[tokio::test]
async fn test_repeat_processing_reports_unchanged() {
    let pipeline = Pipeline::new().await;
    let object = upload_ref("acme", "dune.json");
    pipeline.upload(&object, &dune());

    let first = pipeline.process(&object, 1).await;
    let second = pipeline.process(&object, 2).await;

    assert_eq!(first.disposition, TaskDisposition::Completed);
    assert_eq!(first.writes.unwrap().count(WriteAction::Inserted), 1);
    assert_eq!(second.disposition, TaskDisposition::Completed);
    assert_eq!(second.writes.unwrap().count(WriteAction::Unchanged), 1);
}

#[tokio::test]
async fn test_partial_batch_writes_valid_and_reports_invalid() {
    let pipeline = Pipeline::new().await;
    let object = upload_ref("acme", "batch.json");
    let payload = json!([
        dune(),
        movie("", 2020, &["drama"], &["Someone"]),
        movie("Heat", 1700, &["crime"], &["Al Pacino"]),
    ]);

    let disposition = pipeline.ingest(&object, &payload).await;
    assert_eq!(disposition, Some(MessageDisposition::Acknowledged));

    let stored = pipeline.stored().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].title, "Dune");

    let published = pipeline.sink.published();
    assert_eq!(published.len(), 1, "one notification per payload");
    let rejection = &published[0];
    assert_eq!(rejection.provider_id, "acme");
    assert_eq!(rejection.object_ref, object.to_string());

    let violations: Vec<(&str, Rule)> = rejection
        .violations
        .iter()
        .map(|v| (v.field.as_str(), v.rule))
        .collect();
    assert_eq!(
        violations,
        vec![("[1].title", Rule::TitleNonEmpty), ("[2].year", Rule::YearRange)]
    );
}

#[tokio::test]
async fn test_partial_batch_outcome_is_rejected_with_writes() {
    let pipeline = Pipeline::new().await;
    let object = upload_ref("acme", "mixed.json");
    pipeline.upload(&object, &json!([heat(), movie("Nope", 2022, &["cooking"], &["Chef"])]));

    let outcome = pipeline.process(&object, 1).await;
    assert_eq!(outcome.disposition, TaskDisposition::Rejected);
    assert!(outcome.disposition.is_terminal());
    assert_eq!(outcome.writes.unwrap().count(WriteAction::Inserted), 1);
    let rejection = outcome.rejection.unwrap();
    assert_eq!(rejection.violations.len(), 1);
    assert_eq!(rejection.violations[0].rule, Rule::GenreAllowed);
}

#[tokio::test]
async fn test_malformed_payload_is_rejected_once() {
    let pipeline = Pipeline::new().await;
    let object = upload_ref("acme", "broken.json");
    pipeline.upload_raw(&object, b"{\"title\": \"Dune\", ");
    pipeline.enqueue_object(&object).await;

    assert_eq!(
        pipeline.deliver_one().await,
        Some(MessageDisposition::Acknowledged)
    );
    assert!(pipeline.stored().await.is_empty());

    let published = pipeline.sink.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].violations.len(), 1);
    assert_eq!(published[0].violations[0].field, "$");
    assert_eq!(published[0].violations[0].rule, Rule::MalformedPayload);
}

#[tokio::test]
async fn test_single_object_violations_use_bare_paths() {
    let pipeline = Pipeline::new().await;
    let object = upload_ref("indie", "bad.json");
    let payload = json!({"title": "Dune", "year": "2021", "genre": ["sci-fi"]});

    pipeline.ingest(&object, &payload).await;

    let published = pipeline.sink.for_provider("indie");
    assert_eq!(published.len(), 1);
    let fields: Vec<&str> = published[0]
        .violations
        .iter()
        .map(|v| v.field.as_str())
        .collect();
    assert!(fields.contains(&"year"));
    assert!(fields.contains(&"cast"));
    assert!(published[0]
        .violations
        .iter()
        .any(|v| v.field == "year" && v.rule == Rule::FieldType));
    assert!(published[0]
        .violations
        .iter()
        .any(|v| v.field == "cast" && v.rule == Rule::RequiredField));
}

#[tokio::test]
async fn test_missing_object_is_rejected_not_retried() {
    let pipeline = Pipeline::new().await;
    let object = upload_ref("acme", "never-uploaded.json");
    pipeline.enqueue_object(&object).await;

    assert_eq!(
        pipeline.deliver_one().await,
        Some(MessageDisposition::Acknowledged)
    );
    assert_eq!(pipeline.pending().await, 0);

    let published = pipeline.sink.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].violations[0].rule, Rule::ObjectMissing);
    assert_eq!(published[0].provider_id, "acme");
}

#[tokio::test]
async fn test_storage_event_with_several_objects() {
    let pipeline = Pipeline::new().await;
    let first = upload_ref("acme", "dune.json");
    let second = upload_ref("globex", "heat.json");
    pipeline.upload(&first, &dune());
    pipeline.upload(&second, &heat());

    pipeline
        .enqueue(&storage_event_envelope(&[first, second]))
        .await;

    assert_eq!(
        pipeline.deliver_one().await,
        Some(MessageDisposition::Acknowledged)
    );
    assert!(pipeline.stored_record("Dune", 2021, "acme").await.is_some());
    assert!(pipeline.stored_record("Heat", 1995, "globex").await.is_some());
}

#[tokio::test]
async fn test_wrapped_notification_envelope() {
    let pipeline = Pipeline::new().await;
    let object = upload_ref("acme", "dune.json");
    pipeline.upload(&object, &dune());

    let inner = storage_event_envelope(std::slice::from_ref(&object));
    pipeline.enqueue(&wrapped_envelope(&inner)).await;

    assert_eq!(
        pipeline.deliver_one().await,
        Some(MessageDisposition::Acknowledged)
    );
    assert_eq!(pipeline.stored().await.len(), 1);
}

#[tokio::test]
async fn test_undecodable_envelope_is_reported_and_acked() {
    let pipeline = Pipeline::new().await;
    pipeline.enqueue(&json!({"hello": "world"})).await;

    assert_eq!(
        pipeline.deliver_one().await,
        Some(MessageDisposition::Acknowledged)
    );
    assert_eq!(pipeline.pending().await, 0);

    let published = pipeline.sink.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].provider_id, UNKNOWN_PROVIDER);
    assert_eq!(published[0].violations[0].rule, Rule::MessageEnvelope);
    assert!(published[0].object_ref.starts_with("message:"));
    assert_eq!(pipeline.consumer.stats().envelope_rejections, 1);
}

#[tokio::test]
async fn test_older_version_never_overwrites_newer() {
    let pipeline = Pipeline::new().await;
    let newer = upload_ref("acme", "dune-v2.json");
    let older = upload_ref("acme", "dune-v1.json");

    pipeline
        .ingest(
            &newer,
            &movie_updated_at("Dune", 2021, &["sci-fi"], &["Zendaya"], at_minute(10)),
        )
        .await;
    let outcome = {
        pipeline.upload(
            &older,
            &movie_updated_at("Dune", 2021, &["sci-fi"], &["Sting"], at_minute(5)),
        );
        pipeline.process(&older, 1).await
    };

    assert_eq!(outcome.disposition, TaskDisposition::Completed);
    assert_eq!(outcome.writes.unwrap().count(WriteAction::Stale), 1);

    let stored = pipeline.stored_record("Dune", 2021, "acme").await.unwrap();
    assert_eq!(stored.cast, vec!["Zendaya".to_string()]);
    assert_eq!(stored.version, 1);
    assert_eq!(stored.ingested_at, at_minute(10));
}

#[tokio::test]
async fn test_newer_version_updates_and_bumps_version() {
    let pipeline = Pipeline::new().await;
    let older = upload_ref("acme", "dune-v1.json");
    let newer = upload_ref("acme", "dune-v2.json");

    pipeline
        .ingest(
            &older,
            &movie_updated_at("Dune", 2021, &["sci-fi"], &["Sting"], at_minute(5)),
        )
        .await;
    pipeline
        .ingest(
            &newer,
            &movie_updated_at("Dune", 2021, &["sci-fi", "adventure"], &["Zendaya"], at_minute(10)),
        )
        .await;

    let stored = pipeline.stored_record("Dune", 2021, "acme").await.unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.cast, vec!["Zendaya".to_string()]);
    assert_eq!(stored.source_object, newer.to_string());
    assert!(stored.genre.contains("adventure"));
}

#[tokio::test]
async fn test_same_title_from_two_providers_are_distinct_records() {
    let pipeline = Pipeline::new().await;
    pipeline.ingest(&upload_ref("acme", "dune.json"), &dune()).await;
    pipeline.ingest(&upload_ref("globex", "dune.json"), &dune()).await;

    let result = pipeline
        .read(&CatalogQuery::by_title_and_year("dune", 2021))
        .await;
    let providers: Vec<&str> = result
        .records
        .iter()
        .map(|r| r.provider_id.as_str())
        .collect();
    assert_eq!(providers, vec!["acme", "globex"]);
}
