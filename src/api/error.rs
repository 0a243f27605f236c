//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::job::JobError;

/// Error body: `{ "ok": false, "error": "<message>" }`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, detail),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "Summary run failed");
                (StatusCode::INTERNAL_SERVER_ERROR, detail)
            }
        };

        let body = ErrorBody {
            ok: false,
            error: message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::AlreadyRunning { .. } => ApiError::Conflict(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
