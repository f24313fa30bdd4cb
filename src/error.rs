//! Server error types with HTTP status code mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Server error type covering loader, cache, and request failures
#[derive(Error, Debug)]
pub enum ServerError {
    /// Requested file, building, or artifact is absent (recoverable)
    #[error("{0}")]
    NotFound(String),

    /// Persisted artifact is malformed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Distributed cache or job executor unreachable.
    ///
    /// Cache and job paths never surface this to a request — they fall back
    /// to local-only / synchronous behavior. It maps to 503 only when a
    /// handler returns it directly.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Missing or invalid request parameter
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// JSON (de)serialization error
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Map error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Parse(_) => StatusCode::BAD_REQUEST,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Json(_) => StatusCode::BAD_REQUEST,
            ServerError::SourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable error kind for response bodies
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::NotFound(_) => "not_found",
            ServerError::Parse(_) => "parse_error",
            ServerError::SourceUnavailable(_) => "source_unavailable",
            ServerError::BadRequest(_) => "bad_request",
            ServerError::Json(_) => "parse_error",
            ServerError::Io(_) => "io_error",
            ServerError::Internal(_) => "internal",
        }
    }

    /// Create a not found error (404)
    pub fn not_found(msg: impl Into<String>) -> Self {
        ServerError::NotFound(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        ServerError::Parse(msg.into())
    }

    /// Create a bad request error
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ServerError::BadRequest(msg.into())
    }

    /// Create a source unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        ServerError::SourceUnavailable(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        ServerError::Internal(msg.into())
    }
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// HTTP status code
    pub status: u16,
    /// Machine-readable error kind
    pub kind: &'static str,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_string(),
            status: status.as_u16(),
            kind: self.kind(),
        };

        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"{}","status":{},"kind":"{}"}}"#,
                self,
                status.as_u16(),
                self.kind()
            )
        });

        (status, [("content-type", "application/json")], json).into_response()
    }
}

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ServerError::not_found("x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::parse("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::bad_request("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::unavailable("x").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServerError::internal("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn kinds_are_stable() {
        assert_eq!(ServerError::not_found("x").kind(), "not_found");
        assert_eq!(ServerError::unavailable("x").kind(), "source_unavailable");
    }
}
