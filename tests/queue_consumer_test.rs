//! Acknowledgement discipline, redelivery and the worker pool lifecycle

mod common;

use std::time::Duration;

use common::*;
use serde_json::json;

use catalog_core::ingestion::{MessageDisposition, TaskDisposition};
use catalog_core::models::{CatalogQuery, Rule};
use catalog_core::query::CacheStatus;

#[tokio::test]
async fn test_transient_store_failure_is_redelivered() {
    let pipeline = Pipeline::new().await;
    let object = upload_ref("acme", "dune.json");
    pipeline.store.fail_next_begins(1);

    let first = pipeline.ingest(&object, &dune()).await;
    assert_eq!(first, Some(MessageDisposition::LeftForRedelivery));
    assert!(pipeline.stored().await.is_empty());
    assert_eq!(pipeline.pending().await, 1);
    assert!(pipeline.sink.is_empty(), "transient failures are not rejections");

    // still leased
    assert_eq!(pipeline.deliver_one().await, None);

    pipeline.expire_leases().await;
    assert_eq!(
        pipeline.deliver_one().await,
        Some(MessageDisposition::Acknowledged)
    );
    assert_eq!(pipeline.pending().await, 0);
    assert_eq!(
        pipeline
            .stored_record("Dune", 2021, "acme")
            .await
            .unwrap()
            .version,
        1
    );

    let stats = pipeline.consumer.stats();
    assert_eq!(stats.tasks_retried, 1);
    assert_eq!(stats.tasks_completed, 1);
    assert_eq!(stats.messages_acked, 1);
    assert_eq!(stats.messages_left, 1);
}

#[tokio::test]
async fn test_transient_fetch_failure_is_retried() {
    let pipeline = Pipeline::new().await;
    let object = upload_ref("acme", "heat.json");
    pipeline.upload(&object, &heat());
    pipeline.objects.fail_next_gets(1);

    let outcome = pipeline.process(&object, 1).await;
    assert_eq!(outcome.disposition, TaskDisposition::Retry);
    assert!(!outcome.exhausted);
    assert!(outcome.error.unwrap().contains("Slow Down"));

    let retried = pipeline.process(&object, 2).await;
    assert_eq!(retried.disposition, TaskDisposition::Completed);
}

#[tokio::test]
async fn test_persistent_failure_exhausts_deliveries() {
    let pipeline = Pipeline::new().await;
    let object = upload_ref("acme", "dune.json");
    pipeline.upload(&object, &dune());
    pipeline.enqueue_object(&object).await;
    pipeline.store.set_down(true);

    for delivery in 1..=MAX_RECEIVE_COUNT {
        assert_eq!(
            pipeline.deliver_one().await,
            Some(MessageDisposition::LeftForRedelivery),
            "delivery {delivery} should not be acknowledged"
        );
        let expected_notifications = usize::from(delivery == MAX_RECEIVE_COUNT);
        assert_eq!(pipeline.sink.len(), expected_notifications);
        pipeline.expire_leases().await;
    }

    // the queue's own redrive takes over after the final delivery
    assert_eq!(pipeline.deliver_one().await, None);
    assert_eq!(pipeline.pending().await, 0);
    assert_eq!(pipeline.dead_lettered().await, 1);

    let published = pipeline.sink.published();
    assert_eq!(published.len(), 1);
    assert!(published[0].is_exhaustion());
    assert_eq!(published[0].delivery_count, MAX_RECEIVE_COUNT);
    assert_eq!(published[0].violations[0].rule, Rule::DeliveryExhausted);
    assert_eq!(pipeline.consumer.stats().deliveries_exhausted, 1);
}

#[tokio::test]
async fn test_failed_invalidation_retries_and_redelivery_repairs_cache() {
    let pipeline = Pipeline::new().await;
    let object = upload_ref("acme", "dune.json");
    pipeline.upload(&object, &dune());
    pipeline.enqueue_object(&object).await;

    pipeline.cache.set_down(true);
    assert_eq!(
        pipeline.deliver_one().await,
        Some(MessageDisposition::LeftForRedelivery)
    );

    // the write committed; reads bypass the unreachable cache
    let stored = pipeline.stored_record("Dune", 2021, "acme").await.unwrap();
    let bypassed = pipeline
        .read(&CatalogQuery::by_title_and_year("Dune", 2021))
        .await;
    assert_eq!(bypassed.cache_status, CacheStatus::Bypass);
    assert_eq!(bypassed.records, vec![stored.clone()]);

    pipeline.cache.set_down(false);
    pipeline.expire_leases().await;
    assert_eq!(
        pipeline.deliver_one().await,
        Some(MessageDisposition::Acknowledged)
    );
    assert_eq!(
        pipeline.stored_record("Dune", 2021, "acme").await.unwrap(),
        stored
    );
}

#[tokio::test]
async fn test_unpublished_rejection_is_retried() {
    let pipeline = Pipeline::new().await;
    let object = upload_ref("acme", "bad.json");
    pipeline.sink.set_down(true);

    let first = pipeline
        .ingest(&object, &movie("Dune", 1500, &["sci-fi"], &["Someone"]))
        .await;
    assert_eq!(first, Some(MessageDisposition::LeftForRedelivery));
    assert!(pipeline.sink.is_empty());

    pipeline.sink.set_down(false);
    pipeline.expire_leases().await;
    assert_eq!(
        pipeline.deliver_one().await,
        Some(MessageDisposition::Acknowledged)
    );
    let published = pipeline.sink.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].delivery_count, 2);
}

#[tokio::test]
async fn test_undecodable_envelope_waits_for_sink() {
    let pipeline = Pipeline::new().await;
    pipeline.sink.set_down(true);
    pipeline.enqueue(&json!("just a string")).await;

    assert_eq!(
        pipeline.deliver_one().await,
        Some(MessageDisposition::LeftForRedelivery)
    );
    assert_eq!(pipeline.pending().await, 1);
}

#[tokio::test]
async fn test_message_with_one_retrying_object_is_not_acked() {
    let pipeline = Pipeline::new().await;
    let flaky = upload_ref("acme", "heat.json");
    let good = upload_ref("acme", "dune.json");
    pipeline.upload(&flaky, &heat());
    pipeline.upload(&good, &dune());
    pipeline
        .enqueue(&storage_event_envelope(&[flaky, good]))
        .await;

    // only the first fetch of the delivery fails
    pipeline.objects.fail_next_gets(1);
    assert_eq!(
        pipeline.deliver_one().await,
        Some(MessageDisposition::LeftForRedelivery)
    );
    assert!(pipeline.stored_record("Dune", 2021, "acme").await.is_some());
    assert!(pipeline.stored_record("Heat", 1995, "acme").await.is_none());

    pipeline.expire_leases().await;
    assert_eq!(
        pipeline.deliver_one().await,
        Some(MessageDisposition::Acknowledged)
    );
    assert_eq!(pipeline.stored().await.len(), 2);
    assert!(pipeline.stored().await.iter().all(|r| r.version == 1));
}

#[tokio::test]
async fn test_rejection_is_reported_once_across_redeliveries() {
    let pipeline = Pipeline::new().await;
    let bad = upload_ref("acme", "bad.json");
    let good = upload_ref("acme", "dune.json");
    pipeline.upload(&bad, &movie("Dune", 1700, &["sci-fi"], &["Someone"]));
    pipeline.upload(&good, &dune());
    pipeline
        .enqueue(&storage_event_envelope(&[bad.clone(), good]))
        .await;

    // bad.json has nothing to write, so the failing begin belongs to dune.json
    pipeline.store.fail_next_begins(1);
    assert_eq!(
        pipeline.deliver_one().await,
        Some(MessageDisposition::LeftForRedelivery)
    );
    assert!(pipeline.sink.is_empty());

    pipeline.expire_leases().await;
    assert_eq!(
        pipeline.deliver_one().await,
        Some(MessageDisposition::Acknowledged)
    );

    let published = pipeline.sink.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].object_ref, bad.to_string());
    assert_eq!(published[0].delivery_count, 2);
    assert!(pipeline.stored_record("Dune", 2021, "acme").await.is_some());
}

#[tokio::test]
async fn test_final_delivery_reports_pending_rejections() {
    let pipeline = Pipeline::new().await;
    let bad = upload_ref("acme", "bad.json");
    let good = upload_ref("acme", "dune.json");
    pipeline.upload(&bad, &movie("Dune", 1700, &["sci-fi"], &["Someone"]));
    pipeline.upload(&good, &dune());
    pipeline
        .enqueue(&storage_event_envelope(&[bad.clone(), good]))
        .await;
    pipeline.store.set_down(true);

    for _ in 1..MAX_RECEIVE_COUNT {
        assert_eq!(
            pipeline.deliver_one().await,
            Some(MessageDisposition::LeftForRedelivery)
        );
        assert!(pipeline.sink.is_empty());
        pipeline.expire_leases().await;
    }

    assert_eq!(
        pipeline.deliver_one().await,
        Some(MessageDisposition::LeftForRedelivery)
    );
    let published = pipeline.sink.published();
    assert_eq!(published.len(), 2);
    assert!(published.iter().any(|r| r.is_exhaustion()));
    assert!(published
        .iter()
        .any(|r| !r.is_exhaustion() && r.object_ref == bad.to_string()));
}

#[tokio::test]
async fn test_worker_pool_processes_and_shuts_down() {
    let pipeline = Pipeline::new().await;
    let titles = ["Alien", "Arrival", "Brazil", "Casablanca", "Heat"];
    for (i, title) in titles.iter().enumerate() {
        let object = upload_ref("acme", &format!("{i}.json"));
        pipeline.upload(&object, &movie(title, 1980 + i as i64, &["drama"], &["Someone"]));
        pipeline.enqueue_object(&object).await;
    }

    let handles = pipeline.consumer.start().await.unwrap();
    assert!(pipeline.consumer.is_running());
    assert_eq!(handles.len(), pipeline.config.consumer.worker_count);

    let store = pipeline.store.clone();
    let expected = titles.len();
    let drained = pipeline
        .wait_for(Duration::from_secs(5), || {
            let store = store.clone();
            async move { store.inner().len().await == expected }
        })
        .await;
    assert!(drained, "workers should ingest every message");

    pipeline.consumer.shutdown(handles).await;
    assert!(!pipeline.consumer.is_running());
    assert_eq!(pipeline.pending().await, 0);

    let stats = pipeline.consumer.stats();
    assert_eq!(stats.messages_acked, titles.len() as u64);
    assert_eq!(stats.tasks_completed, titles.len() as u64);
}
