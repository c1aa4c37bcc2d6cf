//! # Health Check Handlers

use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::debug;

use crate::cache::CacheService;
use crate::logging::get_environment;
use crate::web::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    /// `healthy` when every dependency answers, otherwise `degraded`
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub environment: String,
    pub services: BTreeMap<String, String>,
}

fn describe(healthy: bool) -> String {
    if healthy { "healthy" } else { "unhealthy" }.to_string()
}

/// Dependency report: GET /health
///
/// Always 200; a degraded cache only slows reads down.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let service = &state.query_service;
    let mut services = BTreeMap::new();

    services.insert(
        format!("store:{}", service.store().backend_name()),
        describe(service.store_healthy().await),
    );
    services.insert(
        format!("cache:{}", service.cache().provider_name()),
        describe(service.cache_healthy().await),
    );
    if let Some(queue) = &state.queue {
        let healthy = matches!(queue.health_check().await, Ok(true));
        services.insert(format!("queue:{}", queue.provider_name()), describe(healthy));
    }

    let all_healthy = services.values().all(|s| s == "healthy");
    debug!(healthy = all_healthy, "Health check");

    Json(HealthResponse {
        status: if all_healthy { "healthy" } else { "degraded" }.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: get_environment(),
        services,
    })
}

/// Readiness check: GET /health/ready
///
/// 503 while the store cannot answer queries.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.query_service.store_healthy().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
