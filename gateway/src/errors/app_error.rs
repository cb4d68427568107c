//! HTTP-facing error type.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::core::session::NotFound;

/// Errors returned by REST handlers.
///
/// Serialized as `{"detail": <message>}` to match the admin API's error shape.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Session not found")]
    SessionNotFound(#[from] NotFound),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        debug!(error = %self, status = %status, "Request failed");
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
