use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::LlmError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Daily limit reached")]
    QuotaExceeded,

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Completion error: {0}")]
    Completion(#[from] LlmError),

    #[error("Payment provider error: {0}")]
    Payment(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::QuotaExceeded => (
                StatusCode::TOO_MANY_REQUESTS,
                "QUOTA_EXCEEDED",
                "Daily limit reached. Upgrade to Pro for unlimited emails.".to_string(),
            ),
            AppError::InvalidSignature(reason) => {
                tracing::warn!("Rejected webhook with invalid signature: {reason}");
                (
                    StatusCode::BAD_REQUEST,
                    "INVALID_SIGNATURE",
                    "Invalid signature".to_string(),
                )
            }
            AppError::InvalidPayload(msg) => {
                tracing::warn!("Rejected webhook payload: {msg}");
                (
                    StatusCode::BAD_REQUEST,
                    "INVALID_PAYLOAD",
                    "Invalid JSON payload".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Completion(e) => {
                tracing::error!("Completion error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "COMPLETION_ERROR",
                    "Failed to rewrite email".to_string(),
                )
            }
            AppError::Payment(msg) => {
                tracing::error!("Payment provider error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PAYMENT_ERROR",
                    "A payment provider error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
