use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use tankobon_sync::SyncError;

/// API error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Upstream error: {0}")]
    Upstream(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "upstream_error", msg.clone()),
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });
        (status, body).into_response()
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match &err {
            SyncError::StateNotProvisioned { id } => {
                ApiError::NotFound(format!("Crawl state not provisioned: {id}"))
            }
            SyncError::UnknownFeed { id } => ApiError::BadRequest(format!("Unknown feed: {id}")),
            SyncError::Scrape(e) => ApiError::Upstream(e.to_string()),
            SyncError::Db(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<tankobon_db::OperationError> for ApiError {
    fn from(err: tankobon_db::OperationError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<tankobon_db::schema::SchemaError> for ApiError {
    fn from(err: tankobon_db::schema::SchemaError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<tankobon_scraper::ScrapeError> for ApiError {
    fn from(err: tankobon_scraper::ScrapeError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}
