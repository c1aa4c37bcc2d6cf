//! # Web API Application State

use std::sync::Arc;
use std::time::Duration;

use crate::config::WebConfig;
use crate::messaging::TaskQueue;
use crate::query::QueryService;

/// Shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    pub query_service: Arc<QueryService>,
    /// Ingestion queue, reported by `/health` when present
    pub queue: Option<Arc<dyn TaskQueue>>,
    pub config: Arc<WebConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("query_service", &self.query_service)
            .field("queue", &self.queue.as_ref().map(|q| q.provider_name()))
            .field("config", &self.config)
            .finish()
    }
}

impl AppState {
    pub fn new(query_service: QueryService, config: WebConfig) -> Self {
        Self {
            query_service: Arc::new(query_service),
            queue: None,
            config: Arc::new(config),
        }
    }

    pub fn with_queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.config.request_timeout_ms)
    }
}
