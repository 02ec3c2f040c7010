//! Error types for teamrole-daemon

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Could not establish the directory connection
    #[error("Directory connection failed: {0}")]
    Connection(#[source] DirectoryError),

    /// Directory error during operation
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// Roster error
    #[error("Roster error: {0}")]
    Roster(#[from] RosterError),

    /// Status API server error
    #[error("Server error: {0}")]
    Server(String),
}

/// Errors reported by a directory backend
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The directory answered with a non-success status
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The directory asked us to back off
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The connection was shut down or the backend refused the call
    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

/// Errors reading a roster source
#[derive(Debug, Error)]
pub enum RosterError {
    /// Roster file could not be read
    #[error("Failed to read roster {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Roster file could not be parsed
    #[error("Failed to parse roster {path}: {message}")]
    Parse { path: String, message: String },

    /// Roster file extension is not json or toml
    #[error("Unsupported roster format: {0}")]
    UnsupportedFormat(String),
}

/// Status API errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// The scheduler is not accepting work
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Result type alias for directory operations
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Result type alias for roster operations
pub type RosterResult<T> = Result<T, RosterError>;
