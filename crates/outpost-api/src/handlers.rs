//! API handlers

pub mod blocks;
pub mod campaigns;
pub mod health;
pub mod send;
pub mod settings;
pub mod webhook;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

/// Error response body shared by all handlers
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Shorthand for the error half of a handler result
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Build a validation error response
pub fn validation_error(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "validation_error".to_string(),
            message: message.to_string(),
        }),
    )
}

/// Build a not-found error response
pub fn not_found(message: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "not_found".to_string(),
            message: message.to_string(),
        }),
    )
}

/// Build an internal error response
pub fn internal_error(message: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal_error".to_string(),
            message: message.to_string(),
        }),
    )
}
