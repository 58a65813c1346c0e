//! Error types for the processing service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::types::TaskStatus;

/// Result type alias for docflow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of failures, reported alongside every error payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Rejected synchronously at submission, never persisted
    Validation,
    /// Unreadable or unsupported file
    Extraction,
    /// External model call failed, timed out, or had nothing to work on
    Inference,
    /// Unknown or unowned task
    NotFound,
    /// Task store unavailable
    Persistence,
    /// Credential missing, invalid, or not allowed
    Auth,
    /// Everything else
    Internal,
}

/// Docflow errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upload exceeds the configured maximum
    #[error("File too large: {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: u64, max: u64 },

    /// Task kind outside the recognized set
    #[error("Invalid task_type '{0}'. Choose from: summarize, extract_keywords, sentiment, translate, qa")]
    InvalidTaskKind(String),

    /// Malformed request field
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Submission tried to act on behalf of a different owner
    #[error("Submitting on behalf of owner {requested} is not permitted")]
    OwnerOverride { requested: i64 },

    /// No extractor registered for the extension
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    /// Extractor failed on the file contents
    #[error("Failed to extract text from '{filename}': {message}")]
    Extraction { filename: String, message: String },

    /// Inference call failed
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Inference call exceeded its time budget
    #[error("Inference timed out after {0}s")]
    InferenceTimeout(u64),

    /// Extracted text had nothing to send to the model
    #[error("File appears to be empty or unreadable.")]
    EmptyInput,

    /// Task not found (or not owned by the caller)
    #[error("Task not found: {0}")]
    NotFound(String),

    /// Task store failure
    #[error("Task store error: {0}")]
    Persistence(String),

    /// Status change that would break the task state machine
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    /// Missing or invalid credential
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an extraction error
    pub fn extraction(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create an inference error
    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference(message.into())
    }

    /// Create a persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::PayloadTooLarge { .. }
            | Error::InvalidTaskKind(_)
            | Error::InvalidRequest(_) => ErrorClass::Validation,
            Error::UnsupportedFormat(_) | Error::Extraction { .. } => ErrorClass::Extraction,
            Error::Inference(_) | Error::InferenceTimeout(_) | Error::EmptyInput | Error::Http(_) => {
                ErrorClass::Inference
            }
            Error::NotFound(_) => ErrorClass::NotFound,
            Error::Persistence(_) | Error::InvalidTransition { .. } => ErrorClass::Persistence,
            Error::Unauthorized(_) | Error::OwnerOverride { .. } => ErrorClass::Auth,
            Error::Config(_) | Error::Io(_) | Error::Json(_) | Error::Internal(_) => {
                ErrorClass::Internal
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            Error::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            Error::InvalidTaskKind(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_task_kind"),
            Error::InvalidRequest(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_request"),
            Error::OwnerOverride { .. } => (StatusCode::FORBIDDEN, "owner_override"),
            Error::UnsupportedFormat(_) => (StatusCode::BAD_REQUEST, "unsupported_type"),
            Error::Extraction { .. } => (StatusCode::BAD_REQUEST, "extraction_error"),
            Error::Inference(_) | Error::EmptyInput => {
                (StatusCode::SERVICE_UNAVAILABLE, "inference_error")
            }
            Error::InferenceTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "inference_timeout"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Persistence(_) => (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable"),
            Error::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            Error::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            Error::Json(_) => (StatusCode::BAD_REQUEST, "json_error"),
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "http_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "class": self.class(),
                "message": self.to_string(),
            }
        }));

        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                axum::http::header::WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}
