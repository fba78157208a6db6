// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
///
/// The domain variants mirror the engine's error taxonomy: configuration
/// errors, admission errors, and lifecycle-transition errors. None of them
/// is fatal; each is a rejected operation returned to the caller.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 400 - weight triple out of range or sum mismatch
    InvalidWeightDistribution(String),

    // 401 - supplied exam code does not match
    InvalidCode,

    // 403 - attempt before the scheduled window opens
    WindowNotOpen,

    // 403 - attempt at or after the scheduled window end
    WindowClosed,

    // 409 - the partial already has an active in-progress session
    SessionAlreadyActive,

    // 409 - the partial already reached a terminal status
    AlreadyTerminal,

    // 409 - lifecycle transition not present in the allowed-transition table
    InvalidTransition(String),

    // 400 - checklist entries do not match the configured item list
    ChecklistMismatch(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response carrying the HTTP status, a
/// stable machine-readable `code` and a human-readable `error` message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_server_error",
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            AppError::InvalidWeightDistribution(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_weight_distribution", msg)
            }
            AppError::InvalidCode => (
                StatusCode::UNAUTHORIZED,
                "invalid_code",
                "Exam code does not match".to_string(),
            ),
            AppError::WindowNotOpen => (
                StatusCode::FORBIDDEN,
                "window_not_open",
                "The scheduled window has not opened yet".to_string(),
            ),
            AppError::WindowClosed => (
                StatusCode::FORBIDDEN,
                "window_closed",
                "The scheduled window has closed".to_string(),
            ),
            AppError::SessionAlreadyActive => (
                StatusCode::CONFLICT,
                "session_already_active",
                "An attempt at this partial is already in progress".to_string(),
            ),
            AppError::AlreadyTerminal => (
                StatusCode::CONFLICT,
                "already_terminal",
                "This partial has already been graded".to_string(),
            ),
            AppError::InvalidTransition(msg) => (StatusCode::CONFLICT, "invalid_transition", msg),
            AppError::ChecklistMismatch(msg) => {
                (StatusCode::BAD_REQUEST, "checklist_mismatch", msg)
            }
        };
        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
