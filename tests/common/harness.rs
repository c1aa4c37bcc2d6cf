#![allow(dead_code)]

//! A complete in-memory pipeline: queue, object store, catalog store, cache, sink,
//! consumer and read path, with every backend reachable for fault injection.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use catalog_core::cache::CacheKeys;
use catalog_core::config::CatalogConfig;
use catalog_core::database::CatalogStore;
use catalog_core::ingestion::{
    build_processor, ConsumerSettings, MessageDisposition, QueueConsumer, TaskOutcome,
    TaskProcessor,
};
use catalog_core::messaging::{InMemoryTaskQueue, ReceiptHandle, RedrivePolicy, TaskQueue};
use catalog_core::models::{CatalogQuery, CatalogRecord, IngestionTask, NaturalKey, ObjectRef};
use catalog_core::query::{QueryResult, QueryService, QuerySettings};

use super::builders::direct_envelope;
use super::doubles::{FlakyCache, FlakyCatalogStore, FlakyObjectStore, FlakySink};

pub const INGESTION_QUEUE: &str = "catalog_ingestion";
pub const DEAD_LETTER_QUEUE: &str = "catalog_ingestion_dlq";
pub const MAX_RECEIVE_COUNT: u32 = 3;

/// Defaults tightened so empty polls and failures resolve quickly
pub fn test_config() -> CatalogConfig {
    let mut config = CatalogConfig::default();
    config.queue.queue_name = INGESTION_QUEUE.to_string();
    config.queue.dead_letter_queue_name = DEAD_LETTER_QUEUE.to_string();
    config.queue.max_receive_count = MAX_RECEIVE_COUNT;
    config.queue.long_poll_wait_ms = 50;
    config.consumer.worker_count = 2;
    config.consumer.fetch_timeout_ms = 1_000;
    config.consumer.write_timeout_ms = 1_000;
    config.consumer.cache_timeout_ms = 500;
    config.consumer.error_backoff_ms = 10;
    config.consumer.shutdown_timeout_ms = 5_000;
    config
}

pub struct Pipeline {
    pub config: CatalogConfig,
    pub queue: Arc<InMemoryTaskQueue>,
    pub objects: FlakyObjectStore,
    pub store: FlakyCatalogStore,
    pub cache: FlakyCache,
    pub sink: FlakySink,
    pub processor: Arc<TaskProcessor<FlakyCache>>,
    pub consumer: Arc<QueueConsumer<FlakyCache>>,
    pub reader: QueryService<FlakyCache>,
}

impl Pipeline {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: CatalogConfig) -> Self {
        let queue = Arc::new(InMemoryTaskQueue::new());
        queue
            .configure_redrive(
                &config.queue.queue_name,
                RedrivePolicy {
                    dead_letter_queue: config.queue.dead_letter_queue_name.clone(),
                    max_receive_count: config.queue.max_receive_count,
                },
            )
            .await;

        let objects = FlakyObjectStore::new();
        let store = FlakyCatalogStore::new();
        let cache = FlakyCache::new();
        let sink = FlakySink::new();

        let processor = Arc::new(build_processor(
            &config,
            Arc::new(objects.clone()),
            Arc::new(store.clone()),
            cache.clone(),
            Arc::new(sink.clone()),
        ));
        let consumer = Arc::new(QueueConsumer::new(
            queue.clone(),
            processor.clone(),
            ConsumerSettings::from_config(&config.queue, &config.consumer),
        ));
        let reader = QueryService::new(
            Arc::new(store.clone()),
            cache.clone(),
            CacheKeys::new(config.cache.key_prefix.clone()),
            QuerySettings::from_config(&config.query, &config.cache, &config.consumer),
        );

        Self {
            config,
            queue,
            objects,
            store,
            cache,
            sink,
            processor,
            consumer,
            reader,
        }
    }

    pub fn upload(&self, object: &ObjectRef, payload: &Value) {
        self.upload_at(object, payload, Utc::now());
    }

    pub fn upload_at(&self, object: &ObjectRef, payload: &Value, last_modified: DateTime<Utc>) {
        self.objects
            .inner()
            .put_at(object, payload.to_string(), last_modified);
    }

    pub fn upload_raw(&self, object: &ObjectRef, bytes: &[u8]) {
        self.objects.inner().put_at(object, bytes.to_vec(), Utc::now());
    }

    pub async fn enqueue(&self, body: &Value) {
        self.queue
            .send_message(INGESTION_QUEUE, body)
            .await
            .expect("enqueue should succeed");
    }

    pub async fn enqueue_object(&self, object: &ObjectRef) {
        self.enqueue(&direct_envelope(object)).await;
    }

    /// Upload a payload and deliver its notification once
    pub async fn ingest(&self, object: &ObjectRef, payload: &Value) -> Option<MessageDisposition> {
        self.upload(object, payload);
        self.enqueue_object(object).await;
        self.deliver_one().await
    }

    /// Lease and handle one message; `None` when nothing was visible
    pub async fn deliver_one(&self) -> Option<MessageDisposition> {
        self.consumer
            .poll_once()
            .await
            .expect("receive should succeed")
    }

    /// Deliver until the queue has nothing visible
    pub async fn drain(&self) -> Vec<MessageDisposition> {
        let mut dispositions = Vec::new();
        while let Some(disposition) = self.deliver_one().await {
            dispositions.push(disposition);
        }
        dispositions
    }

    /// Simulate lease expiry on every in-flight message
    pub async fn expire_leases(&self) {
        self.queue.expire_leases(INGESTION_QUEUE).await;
    }

    /// Run the processor directly on an object, bypassing the queue
    pub async fn process(&self, object: &ObjectRef, delivery_count: u32) -> TaskOutcome {
        let task = IngestionTask {
            object_ref: object.clone(),
            receipt: ReceiptHandle::from(1_i64),
            delivery_count,
        };
        self.processor.process(&task).await
    }

    pub async fn stored(&self) -> Vec<CatalogRecord> {
        self.store.inner().snapshot().await
    }

    pub async fn stored_record(&self, title: &str, year: i32, provider: &str) -> Option<CatalogRecord> {
        self.store
            .inner()
            .get(&NaturalKey {
                title: title.to_string(),
                release_year: year,
                provider_id: provider.to_string(),
            })
            .await
            .expect("in-memory get cannot fail")
    }

    pub async fn read(&self, query: &CatalogQuery) -> QueryResult {
        self.reader.lookup(query).await.expect("lookup should succeed")
    }

    /// Messages still on the ingestion queue, leased or not
    pub async fn pending(&self) -> usize {
        self.queue.queue_length(INGESTION_QUEUE).await
    }

    pub async fn dead_lettered(&self) -> usize {
        self.queue.queue_length(DEAD_LETTER_QUEUE).await
    }

    /// Poll a condition until it holds or `timeout` elapses
    pub async fn wait_for<F, Fut>(&self, timeout: Duration, mut condition: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if condition().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        condition().await
    }
}
