//! Operational-surface error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use outbox::OutboxError;

/// Error type for the operational HTTP endpoints.
#[derive(Debug)]
pub enum OpsError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Storage failure.
    Store(OutboxError),
}

impl From<OutboxError> for OpsError {
    fn from(error: OutboxError) -> Self {
        OpsError::Store(error)
    }
}

impl IntoResponse for OpsError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            OpsError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            OpsError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            OpsError::Store(error) => {
                tracing::error!(%error, "operational endpoint store failure");
                (StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}
