//! Error types for Copysmith
//!
//! All hard errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.
//! Soft failures in the image path never become an `AppError`; see
//! [`crate::service::SoftFailure`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Which monthly counter a quota error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaKind {
    Content,
    Image,
}

impl QuotaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Image => "image",
        }
    }
}

/// Application-wide error type
///
/// This enum represents all possible hard errors. It implements
/// `IntoResponse` to automatically convert errors to appropriate
/// HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Session signature verification failed (401)
    #[error("Invalid signature")]
    InvalidSignature,

    /// Missing or malformed request fields (400)
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Monthly quota exhausted (403)
    #[error("Monthly {} quota exceeded", .0.as_str())]
    QuotaExceeded(QuotaKind),

    /// Text provider failed or timed out (500)
    #[error("Text generation failed: {0}")]
    TextGeneration(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Image storage error (500)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Encryption/signing error (500)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    fn error_type(&self) -> &'static str {
        match self {
            AppError::NotFound => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::InvalidSignature => "invalid_signature",
            AppError::Validation(_) => "invalid_request",
            AppError::QuotaExceeded(_) => "quota_exceeded",
            AppError::TextGeneration(_) => "text_generation_failed",
            AppError::Database(_) => "database",
            AppError::Storage(_) => "storage",
            AppError::Config(_) => "config",
            AppError::Encryption(_) => "encryption",
            AppError::Internal(_) => "internal",
        }
    }

    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized | AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::QuotaExceeded(_) => StatusCode::FORBIDDEN,
            AppError::TextGeneration(_)
            | AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Config(_)
            | AppError::Encryption(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let status = self.status_code();
        let error_type = self.error_type();
        let error_message = match &self {
            AppError::Database(_) => "Database error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::Validation(msg) => msg.clone(),
            _ => self.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, error_type, "Request failed");
        }

        // Record error metric
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL
            .with_label_values(&[error_type, "unknown"])
            .inc();

        let mut body = serde_json::json!({
            "error": error_message,
            "type": error_type,
        });
        if let AppError::QuotaExceeded(kind) = &self {
            body["quota"] = serde_json::json!(kind.as_str());
        }

        (status, Json(body)).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
