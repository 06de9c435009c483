//! HTTP handlers

pub mod health;
pub mod messages;
pub mod recurring;
pub mod tracking;

use axum::http::StatusCode;
use axum::Json;
use mailpilot_common::Error;
use serde::Serialize;
use tracing::error;

/// Error response body
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Map an engine error onto an HTTP response
pub fn error_response(err: Error) -> (StatusCode, Json<ErrorResponse>) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status.is_server_error() {
        error!(error = %err, "request failed");
    }

    (
        status,
        Json(ErrorResponse {
            error: err.code().to_string(),
            message: err.to_string(),
        }),
    )
}
