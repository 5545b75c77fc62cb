//! API Error Types
//!
//! Defines error types for the API layer and implements conversion
//! to HTTP responses with appropriate status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::orchestrator::WatchError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Room watch/unwatch/status error
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Watch(WatchError::AlreadyWatched(_)) => {
                (StatusCode::CONFLICT, "ALREADY_WATCHED")
            }
            ApiError::Watch(WatchError::NotWatched(_)) => (StatusCode::NOT_FOUND, "NOT_WATCHED"),
            ApiError::Watch(WatchError::Stream(_)) => (StatusCode::BAD_GATEWAY, "STREAM_ERROR"),
            ApiError::Watch(WatchError::StatusRequest(_))
            | ApiError::Watch(WatchError::MalformedStatus) => {
                (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR")
            }
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        };

        let request_id = uuid::Uuid::new_v4().to_string();

        tracing::error!(
            request_id = %request_id,
            error_code = %code,
            error_message = %self,
            "API error occurred"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
            },
            request_id,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
