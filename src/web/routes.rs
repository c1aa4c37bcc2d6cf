//! # Web API Route Definitions

use axum::routing::{get, post};
use axum::Router;

use crate::web::handlers;
use crate::web::state::AppState;

/// Routes nested under `/api/v1`
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/movies", get(handlers::movies::list_movies))
        .route("/movies/search", post(handlers::movies::search_movies))
        .route(
            "/movies/:provider_id/:release_year/:title",
            get(handlers::movies::get_movie),
        )
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/health/ready", get(handlers::health::readiness))
}
