//! Unified error handling for the server.
//!
//! Every failure is reported with the backend error body
//! `{"code": n, "error": "..."}` so clients can map it to an error code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nimbus_engine::codes;
use serde::Serialize;
use serde_json::Value;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    ObjectNotFound(String),

    #[error("{0}")]
    InvalidJson(String),

    #[error("{0}")]
    InvalidQuery(String),

    #[error("invalid class name: {0}")]
    InvalidClassName(String),

    #[error("{0}")]
    InvalidKeyName(String),

    #[error("{0}")]
    InvalidPointer(String),

    #[error("{0}")]
    IncorrectType(String),

    #[error("too many commands in batch request: {count} (max {max})")]
    TooManyCommands { count: usize, max: usize },

    #[error("unauthorized")]
    Unauthorized,
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse<'a> {
    code: i64,
    error: &'a str,
}

impl AppError {
    /// Backend error code.
    pub fn code(&self) -> i64 {
        match self {
            AppError::ObjectNotFound(_) => codes::OBJECT_NOT_FOUND,
            AppError::InvalidJson(_) => codes::INVALID_JSON,
            AppError::InvalidQuery(_) => codes::INVALID_QUERY,
            AppError::InvalidClassName(_) => codes::INVALID_CLASS_NAME,
            AppError::InvalidKeyName(_) => codes::INVALID_KEY_NAME,
            AppError::InvalidPointer(_) => codes::INVALID_POINTER,
            AppError::IncorrectType(_) => codes::INCORRECT_TYPE,
            AppError::TooManyCommands { .. } => codes::TOO_MANY_COMMANDS_IN_BATCH_REQUEST,
            AppError::Unauthorized => codes::OPERATION_FORBIDDEN,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ObjectNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// The error body, as embedded in batch results.
    pub fn to_body(&self) -> Value {
        let message = self.to_string();
        serde_json::to_value(ErrorResponse {
            code: self.code(),
            error: &message,
        })
        .unwrap_or(Value::Null)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(code = self.code(), status = status.as_u16(), "Request failed: {}", self);
        (status, Json(self.to_body())).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
