//! # Bootstrap
//!
//! Builds the configured backends and assembles the processor and read API from them.
//! Both binaries are thin wrappers around [`ProcessorBootstrap`] and [`ApiBootstrap`].

use std::sync::Arc;

use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::{CacheKeys, CacheProvider};
use crate::config::{CatalogConfig, NotificationSinkKind, ObjectStoreKind, QueueProviderKind};
use crate::database::{create_pool, run_migrations, CatalogStore, PgCatalogStore};
use crate::error::Result;
use crate::ingestion::{
    build_processor, ConsumerSettings, ConsumerStatsSnapshot, LogNotificationSink,
    NotificationSink, QueueConsumer, QueueNotificationSink,
};
use crate::messaging::{InMemoryTaskQueue, PgmqTaskQueue, RedrivePolicy, TaskQueue};
use crate::objects::{FileSystemObjectStore, InMemoryObjectStore, ObjectStore};
use crate::query::{QueryService, QuerySettings};
use crate::web::AppState;

/// Open the database pool, applying migrations when configured
pub async fn connect_database(config: &CatalogConfig) -> Result<PgPool> {
    let pool = create_pool(&config.database).await?;
    if config.database.run_migrations {
        run_migrations(&pool).await?;
    }
    Ok(pool)
}

/// The ingestion queue and its dead-letter path
pub async fn build_task_queue(config: &CatalogConfig, pool: &PgPool) -> Result<Arc<dyn TaskQueue>> {
    let queue = &config.queue;
    let task_queue: Arc<dyn TaskQueue> = match queue.provider {
        QueueProviderKind::Pgmq => Arc::new(
            PgmqTaskQueue::new_with_pool(
                pool.clone(),
                queue.max_receive_count,
                queue.poll_interval(),
            )
            .await,
        ),
        QueueProviderKind::InMemory => {
            let in_memory = InMemoryTaskQueue::new();
            in_memory
                .configure_redrive(
                    &queue.queue_name,
                    RedrivePolicy {
                        dead_letter_queue: queue.dead_letter_queue_name.clone(),
                        max_receive_count: queue.max_receive_count,
                    },
                )
                .await;
            Arc::new(in_memory)
        }
    };

    task_queue.ensure_queue(&queue.queue_name).await?;
    info!(
        provider = task_queue.provider_name(),
        queue = %queue.queue_name,
        "Ingestion queue ready"
    );
    Ok(task_queue)
}

pub fn build_object_store(config: &CatalogConfig) -> Arc<dyn ObjectStore> {
    match config.object_store.provider {
        ObjectStoreKind::FileSystem => {
            Arc::new(FileSystemObjectStore::new(config.object_store.root_dir.clone()))
        }
        ObjectStoreKind::InMemory => Arc::new(InMemoryObjectStore::new()),
    }
}

pub fn build_notification_sink(
    config: &CatalogConfig,
    queue: Arc<dyn TaskQueue>,
) -> Arc<dyn NotificationSink> {
    match config.notifications.sink {
        NotificationSinkKind::Queue => Arc::new(QueueNotificationSink::new(
            queue,
            config.notifications.queue_prefix.clone(),
        )),
        NotificationSinkKind::Log => Arc::new(LogNotificationSink),
    }
}

/// A running consumer pool
pub struct ProcessorHandle {
    pub consumer: Arc<QueueConsumer>,
    handles: Vec<JoinHandle<()>>,
}

impl ProcessorHandle {
    pub fn stats(&self) -> ConsumerStatsSnapshot {
        self.consumer.stats()
    }

    /// Stop leasing and wait for in-flight messages
    pub async fn shutdown(self) {
        self.consumer.shutdown(self.handles).await;
    }
}

pub struct ProcessorBootstrap;

impl ProcessorBootstrap {
    pub async fn bootstrap(config: &CatalogConfig) -> Result<ProcessorHandle> {
        let pool = connect_database(config).await?;
        let queue = build_task_queue(config, &pool).await?;
        let store: Arc<dyn CatalogStore> = Arc::new(PgCatalogStore::new(pool));
        let cache = CacheProvider::from_config_graceful(&config.cache).await;
        let sink = build_notification_sink(config, queue.clone());

        let processor = build_processor(config, build_object_store(config), store, cache, sink);
        let consumer = Arc::new(QueueConsumer::new(
            queue,
            Arc::new(processor),
            ConsumerSettings::from_config(&config.queue, &config.consumer),
        ));
        let handles = consumer.start().await?;

        Ok(ProcessorHandle { consumer, handles })
    }
}

pub struct ApiBootstrap;

impl ApiBootstrap {
    pub async fn bootstrap(config: &CatalogConfig) -> Result<AppState> {
        let pool = connect_database(config).await?;
        let queue = match config.queue.provider {
            QueueProviderKind::Pgmq => Some(build_task_queue(config, &pool).await?),
            QueueProviderKind::InMemory => None,
        };
        let store: Arc<dyn CatalogStore> = Arc::new(PgCatalogStore::new(pool));
        let cache = CacheProvider::from_config_graceful(&config.cache).await;

        let query_service = QueryService::new(
            store,
            cache,
            CacheKeys::new(config.cache.key_prefix.clone()),
            QuerySettings::from_config(&config.query, &config.cache, &config.consumer),
        );

        let state = AppState::new(query_service, config.web.clone());
        Ok(match queue {
            Some(queue) => state.with_queue(queue),
            None => state,
        })
    }
}
