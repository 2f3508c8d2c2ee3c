//! Centralized API error handling
//!
//! Maps workflow errors onto HTTP status codes and the JSON error envelope
//! `{ "error": { "code", "message", "details"? } }`.

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::loan::{LoanError, TransitionError};

/// Seconds a client should wait before retrying a contended investment
const LOCK_RETRY_AFTER_SECS: &str = "1";

/// API error type with HTTP status code mapping
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    InvalidTransition(TransitionError),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Duplicate request: idempotency key already used")]
    DuplicateRequest,

    #[error("Loan is busy: {0}")]
    LockContended(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Error details in the response
#[derive(Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::InvalidTransition(_) => "INVALID_TRANSITION",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::DuplicateRequest => "DUPLICATE_REQUEST",
            ApiError::LockContended(_) => "LOCK_CONTENDED",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::InvalidTransition(_) => StatusCode::CONFLICT,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::DuplicateRequest => StatusCode::CONFLICT,
            ApiError::LockContended(_) => StatusCode::LOCKED,
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            ApiError::InvalidTransition(e) => Some(e.cause.to_string()),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        // Log server errors
        match &self {
            ApiError::ServiceUnavailable(_) => {
                tracing::error!(error = %message, code = %error_code, "Server error occurred");
            }
            _ => {
                tracing::debug!(error = %message, code = %error_code, "Client error occurred");
            }
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code: error_code.to_string(),
                details: self.details(),
                message,
            },
        };

        match self {
            ApiError::LockContended(_) => (
                status,
                [(header::RETRY_AFTER, LOCK_RETRY_AFTER_SECS)],
                Json(body),
            )
                .into_response(),
            _ => (status, Json(body)).into_response(),
        }
    }
}

impl From<LoanError> for ApiError {
    fn from(err: LoanError) -> Self {
        match err {
            LoanError::NotFound(what) => ApiError::NotFound(what),
            LoanError::InvalidTransition(e) => ApiError::InvalidTransition(e),
            LoanError::ValidationFailed(message) => ApiError::ValidationError(message),
            LoanError::Conflict(message) => ApiError::Conflict(message),
            LoanError::DuplicateRequest => ApiError::DuplicateRequest,
            LoanError::LockContended(loan_id) => ApiError::LockContended(format!(
                "loan {} has an investment in progress, retry shortly",
                loan_id
            )),
            err @ LoanError::CollaboratorUnavailable { .. } => {
                ApiError::ServiceUnavailable(err.to_string())
            }
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid JSON: {}", err.body_text()))
    }
}

/// Result type alias using ApiError
pub type ApiResult<T> = Result<T, ApiError>;
