//! Per-request deadline

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::web::errors::ApiError;
use crate::web::state::AppState;

/// Answer 408 when a handler outlives the configured request timeout
pub async fn request_timeout(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let timeout = state.request_timeout();
    match tokio::time::timeout(timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(path = %path, timeout = ?timeout, "Request timed out");
            ApiError::Timeout.into_response()
        }
    }
}
