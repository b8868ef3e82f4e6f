//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use broker::BrokerError;
use domain::DomainError;
use messagebus::{BusError, ErrorKind};
use unit_of_work::StorageError;

/// API-level error type that maps to HTTP responses.
///
/// Every error renders as `{"ok": false, "msg": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),

    /// Command dispatch failed.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Reading storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Bus(err) => status_for(err.kind()),
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = ?self, "internal server error");
            "Internal server error.".to_string()
        } else {
            self.to_string()
        };

        let body = serde_json::json!({ "ok": false, "msg": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match ErrorKind::from(&err) {
            ErrorKind::NotFound => ApiError::NotFound(err.to_string()),
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

/// Failures while wiring up or running the server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("broker: {0}")]
    Broker(#[from] BrokerError),

    #[error("message bus: {0}")]
    Bus(#[from] BusError),

    #[error("domain: {0}")]
    Domain(#[from] DomainError),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}
