//! Error types for the cache client
//!
//! Provides unified error handling using thiserror. Absence of a key is not
//! an error: lookups return `Option`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Bad key or TTL supplied by the caller. Never retried.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend could not be reached after the retry policy was exhausted
    #[error("Backend '{backend}' unavailable after {attempts} attempt(s): {reason}")]
    BackendUnavailable {
        backend: &'static str,
        attempts: u32,
        reason: String,
    },
}

impl CacheError {
    /// Shorthand for an `InvalidArgument` error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        CacheError::InvalidArgument(msg.into())
    }

    /// Returns true when the failure came from the storage backend.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CacheError::BackendUnavailable { .. })
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for CacheError {
    fn from(err: bincode::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            CacheError::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (CacheError::invalid("empty key"), StatusCode::BAD_REQUEST),
            (
                CacheError::Serialization("bad".to_string()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                CacheError::BackendUnavailable {
                    backend: "redis",
                    attempts: 3,
                    reason: "connection refused".to_string(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_unavailable_message_mentions_attempts() {
        let err = CacheError::BackendUnavailable {
            backend: "redis",
            attempts: 3,
            reason: "timed out".to_string(),
        };
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("3 attempt"));
        assert!(err.to_string().contains("redis"));
    }
}
