//! # Web API Error Types
//!
//! API errors and their HTTP mapping. Store outages surface as 503 rather than 500 so
//! load balancers and clients treat them as retryable.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::error::CatalogError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Service temporarily unavailable")]
    ServiceUnavailable,

    #[error("Request timeout")]
    Timeout,

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (error_code, message) = match &self {
            ApiError::BadRequest { message } => ("BAD_REQUEST", message.as_str()),
            ApiError::NotFound { resource } => ("NOT_FOUND", resource.as_str()),
            ApiError::ServiceUnavailable => {
                ("SERVICE_UNAVAILABLE", "Service temporarily unavailable")
            }
            ApiError::Timeout => ("TIMEOUT", "Request timeout"),
            ApiError::Internal => ("INTERNAL_ERROR", "Internal server error"),
        };

        let body = json!({
            "error": {
                "code": error_code,
                "message": message
            }
        });

        (self.status_code(), Json(body)).into_response()
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::InvalidQuery(message) => ApiError::BadRequest { message },
            other if other.is_unavailable() => {
                error!(error = %other, "Catalog read failed");
                ApiError::ServiceUnavailable
            }
            other => {
                error!(error = %other, "Unexpected catalog read failure");
                ApiError::Internal
            }
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::bad_request(format!("Invalid JSON: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::StoreError;

    #[test]
    fn test_catalog_error_mapping() {
        let invalid: ApiError = CatalogError::invalid_query("limit must be between 1 and 100").into();
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

        let outage: ApiError = CatalogError::from(StoreError::unavailable("pool closed")).into();
        assert_eq!(outage.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let timeout: ApiError =
            CatalogError::timeout("catalog query", std::time::Duration::from_secs(5)).into();
        assert_eq!(timeout.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
