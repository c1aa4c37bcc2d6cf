//! A read issued after a write completes never observes the pre-write catalog

mod common;

use std::time::Duration;

use common::*;

use catalog_core::cache::{CacheKeys, CacheScope, CacheService};
use catalog_core::models::{CatalogQuery, NaturalKey, YearFilter};
use catalog_core::query::{CacheStatus, CachedPage};

fn cast_of(result: &catalog_core::query::QueryResult) -> Vec<String> {
    result
        .records
        .iter()
        .flat_map(|r| r.cast.iter().cloned())
        .collect()
}

#[tokio::test]
async fn test_update_is_visible_to_the_next_read() {
    let pipeline = Pipeline::new().await;
    let query = CatalogQuery::by_title_and_year("Dune", 2021);

    pipeline
        .ingest(
            &upload_ref("acme", "v1.json"),
            &movie_updated_at("Dune", 2021, &["sci-fi"], &["Sting"], at_minute(1)),
        )
        .await;
    pipeline.read(&query).await;
    assert_eq!(pipeline.read(&query).await.cache_status, CacheStatus::Hit);

    pipeline
        .ingest(
            &upload_ref("acme", "v2.json"),
            &movie_updated_at("Dune", 2021, &["sci-fi"], &["Zendaya"], at_minute(2)),
        )
        .await;

    let after = pipeline.read(&query).await;
    assert_eq!(after.cache_status, CacheStatus::Miss);
    assert_eq!(cast_of(&after), vec!["Zendaya".to_string()]);
}

#[tokio::test]
async fn test_stale_fill_from_a_racing_reader_is_unreachable() {
    let pipeline = Pipeline::new().await;
    let query = CatalogQuery::by_title_and_year("Dune", 2021);
    let keys = CacheKeys::new(pipeline.config.cache.key_prefix.clone());

    pipeline
        .ingest(
            &upload_ref("acme", "v1.json"),
            &movie_updated_at("Dune", 2021, &["sci-fi"], &["Sting"], at_minute(1)),
        )
        .await;
    let before = pipeline.read(&query).await;

    // a reader that picked up the generation before the write...
    let normalized = query.normalize(pipeline.reader.limits()).unwrap();
    let scope = CacheScope::anchor_for(&normalized);
    let old_generation = pipeline
        .cache
        .get(&keys.generation_key(&scope))
        .await
        .unwrap()
        .expect("generation minted by the first read");

    pipeline
        .ingest(
            &upload_ref("acme", "v2.json"),
            &movie_updated_at("Dune", 2021, &["sci-fi"], &["Zendaya"], at_minute(2)),
        )
        .await;

    // ...and stores its pre-write result only after the writer invalidated
    let stale_key = keys.entry_key(&scope, &old_generation, &normalized.fingerprint());
    pipeline
        .cache
        .set(
            &stale_key,
            &serde_json::to_string(&CachedPage::from(&before)).unwrap(),
            Duration::from_secs(300),
        )
        .await
        .unwrap();

    let after = pipeline.read(&query).await;
    assert_eq!(cast_of(&after), vec!["Zendaya".to_string()]);
}

#[tokio::test]
async fn test_key_lookup_sees_insert_and_update() {
    let pipeline = Pipeline::new().await;
    let key = NaturalKey::new("Dune", 2021, "acme");

    let absent = pipeline.reader.lookup_key(&key).await.unwrap();
    assert!(absent.record.is_none());
    assert_eq!(
        pipeline.reader.lookup_key(&key).await.unwrap().cache_status,
        CacheStatus::Hit
    );

    pipeline
        .ingest(
            &upload_ref("acme", "v1.json"),
            &movie_updated_at("Dune", 2021, &["sci-fi"], &["Sting"], at_minute(1)),
        )
        .await;
    let inserted = pipeline.reader.lookup_key(&key).await.unwrap();
    assert_eq!(inserted.cache_status, CacheStatus::Miss);
    assert_eq!(inserted.record.map(|r| r.cast), Some(vec!["Sting".to_string()]));

    pipeline
        .ingest(
            &upload_ref("acme", "v2.json"),
            &movie_updated_at("Dune", 2021, &["sci-fi"], &["Zendaya"], at_minute(2)),
        )
        .await;
    let updated = pipeline.reader.lookup_key(&key).await.unwrap().record.unwrap();
    assert_eq!(updated.cast, vec!["Zendaya".to_string()]);
    assert_eq!(updated.version, 2);
}

#[tokio::test]
async fn test_genre_listing_sees_new_titles() {
    let pipeline = Pipeline::new().await;
    let query = CatalogQuery {
        genre: vec!["Sci-Fi".to_string()],
        ..Default::default()
    };

    pipeline.ingest(&upload_ref("acme", "dune.json"), &dune()).await;
    assert_eq!(pipeline.read(&query).await.records.len(), 1);
    assert_eq!(pipeline.read(&query).await.cache_status, CacheStatus::Hit);

    pipeline
        .ingest(
            &upload_ref("acme", "arrival.json"),
            &movie("Arrival", 2016, &["sci-fi", "drama"], &["Amy Adams"]),
        )
        .await;

    let titles: Vec<String> = pipeline
        .read(&query)
        .await
        .records
        .into_iter()
        .map(|r| r.title)
        .collect();
    assert_eq!(titles, vec!["Dune".to_string(), "Arrival".to_string()]);
}

#[tokio::test]
async fn test_unfiltered_and_range_queries_are_invalidated() {
    let pipeline = Pipeline::new().await;
    let everything = CatalogQuery::default();
    let nineties = CatalogQuery {
        year: Some(YearFilter::Range {
            from: Some(1990),
            to: Some(1999),
        }),
        ..Default::default()
    };

    assert!(pipeline.read(&everything).await.records.is_empty());
    assert!(pipeline.read(&nineties).await.records.is_empty());

    pipeline.ingest(&upload_ref("acme", "heat.json"), &heat()).await;

    assert_eq!(pipeline.read(&everything).await.records.len(), 1);
    assert_eq!(pipeline.read(&nineties).await.records.len(), 1);
}

#[tokio::test]
async fn test_genre_removed_by_update_drops_out_of_old_scope() {
    let pipeline = Pipeline::new().await;
    let thrillers = CatalogQuery {
        genre: vec!["thriller".to_string()],
        ..Default::default()
    };

    pipeline
        .ingest(
            &upload_ref("acme", "v1.json"),
            &movie_updated_at("Heat", 1995, &["crime", "thriller"], &["Al Pacino"], at_minute(1)),
        )
        .await;
    assert_eq!(pipeline.read(&thrillers).await.records.len(), 1);

    pipeline
        .ingest(
            &upload_ref("acme", "v2.json"),
            &movie_updated_at("Heat", 1995, &["crime"], &["Al Pacino"], at_minute(2)),
        )
        .await;
    assert!(pipeline.read(&thrillers).await.records.is_empty());
}

#[tokio::test]
async fn test_stale_write_does_not_disturb_cached_results() {
    let pipeline = Pipeline::new().await;
    let query = CatalogQuery::by_title_and_year("Dune", 2021);

    pipeline
        .ingest(
            &upload_ref("acme", "new.json"),
            &movie_updated_at("Dune", 2021, &["sci-fi"], &["Zendaya"], at_minute(9)),
        )
        .await;
    pipeline.read(&query).await;

    pipeline
        .ingest(
            &upload_ref("acme", "old.json"),
            &movie_updated_at("Dune", 2021, &["sci-fi"], &["Sting"], at_minute(1)),
        )
        .await;

    let after = pipeline.read(&query).await;
    assert_eq!(after.cache_status, CacheStatus::Hit);
    assert_eq!(cast_of(&after), vec!["Zendaya".to_string()]);
}

#[tokio::test]
async fn test_unreachable_cache_degrades_to_store_reads() {
    let pipeline = Pipeline::new().await;
    pipeline.ingest(&upload_ref("acme", "heat.json"), &heat()).await;
    pipeline.cache.set_down(true);

    let result = pipeline
        .read(&CatalogQuery::by_title_and_year("heat", 1995))
        .await;
    assert_eq!(result.cache_status, CacheStatus::Bypass);
    assert_eq!(result.records.len(), 1);
}
