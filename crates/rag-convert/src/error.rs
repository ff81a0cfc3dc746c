//! Error types for the document converter

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for conversion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Conversion errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File extension is not one of the recognized formats
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// The format library could not interpret the file content
    #[error("Failed to extract '{filename}': {message}")]
    Extraction { filename: String, message: String },

    /// The request did not carry a usable upload
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    /// The upload exceeded the configured size limit
    #[error("Upload too large: {0}")]
    UploadTooLarge(String),

    /// IO error while staging or finalizing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an extraction error
    pub fn extraction(filename: impl Into<String>, message: impl ToString) -> Self {
        Self::Extraction {
            filename: filename.into(),
            message: message.to_string(),
        }
    }

    /// Create an unsupported format error
    pub fn unsupported(extension: impl Into<String>) -> Self {
        Self::UnsupportedFormat(extension.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Short machine-friendly error kind, used in HTTP bodies and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::UnsupportedFormat(_) => "unsupported_type",
            Error::Extraction { .. } => "parse_error",
            Error::InvalidUpload(_) => "invalid_upload",
            Error::UploadTooLarge(_) => "payload_too_large",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
            Error::Internal(_) => "internal_error",
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("Conversion task failed: {}", err))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Config(_)
            | Error::UnsupportedFormat(_)
            | Error::Extraction { .. }
            | Error::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            Error::UploadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Io(_) | Error::Json(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
