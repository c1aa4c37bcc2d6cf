//! # Read API
//!
//! Axum server in front of the [`QueryService`](crate::query::QueryService).
//!
//! - `GET /api/v1/movies` - filters as query parameters
//! - `POST /api/v1/movies/search` - filters as a JSON body
//! - `GET /health`, `GET /health/ready`

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::Router;

pub use errors::ApiError;
pub use state::AppState;

pub fn create_app(app_state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .nest("/api/v1", routes::api_v1_routes())
        .layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            middleware::timeout::request_timeout,
        ))
        .with_state(app_state)
}
