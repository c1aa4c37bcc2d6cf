//! # Ingestion Pipeline
//!
//! Queue message in, catalog rows and rejection notifications out:
//!
//! ```text
//! QueueConsumer ─> TaskProcessor ─> PayloadFetcher ─> RecordValidator
//!                                      │                  │
//!                                      │      accepted ─> IdempotentWriter ─> CacheSynchronizer
//!                                      └───── rejected ─> DeadLetterRouter ─> NotificationSink
//! ```

pub mod cache_sync;
pub mod consumer;
pub mod dead_letter;
pub mod fetcher;
pub mod processor;
pub mod rules;
pub mod validator;
pub mod writer;

use std::sync::Arc;

pub use cache_sync::CacheSynchronizer;
pub use consumer::{
    ConsumerSettings, ConsumerStats, ConsumerStatsSnapshot, MessageDisposition, QueueConsumer,
};
pub use dead_letter::{
    DeadLetterRouter, InMemoryNotificationSink, LogNotificationSink, NotificationSink,
    QueueNotificationSink,
};
pub use fetcher::PayloadFetcher;
pub use processor::{TaskDisposition, TaskOutcome, TaskProcessor};
pub use rules::{BusinessRule, CandidateRecord, RuleContext, RuleFailure, RuleTable};
pub use validator::{RecordSource, RecordValidator};
pub use writer::{resolve, IdempotentWriter, WriteAction, WriteDecision, WriteEffect, WriteSummary};

use crate::cache::{CacheKeys, CacheService};
use crate::config::CatalogConfig;
use crate::database::CatalogStore;
use crate::objects::ObjectStore;

/// Wire a processor from configuration and already-built backends
pub fn build_processor<C: CacheService>(
    config: &CatalogConfig,
    objects: Arc<dyn ObjectStore>,
    store: Arc<dyn CatalogStore>,
    cache: C,
    sink: Arc<dyn NotificationSink>,
) -> TaskProcessor<C> {
    TaskProcessor::new(
        PayloadFetcher::new(objects, config.consumer.fetch_timeout()),
        RecordValidator::new(config.validation.clone()),
        IdempotentWriter::new(store, config.consumer.write_timeout()),
        CacheSynchronizer::new(
            cache,
            CacheKeys::new(config.cache.key_prefix.clone()),
            config.consumer.cache_timeout(),
        ),
        DeadLetterRouter::new(sink),
        config.queue.max_receive_count,
    )
}
