//! Error types for the governance service.
//!
//! Defines a unified error type that maps cleanly to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Unified error type for governance operations.
#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// A concurrent writer changed the same interaction first.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The governance logic itself produced an impossible value.
    /// Fatal for the pipeline run that hit it.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body for API clients.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for GovernanceError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            GovernanceError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None)
            }
            GovernanceError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None)
            }
            GovernanceError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone(), None),
            GovernanceError::Database(e) => {
                // Log the actual error but don't expose internals
                tracing::error!(error = %e, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    None,
                )
            }
            GovernanceError::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                "Configuration error".to_string(),
                Some(msg.clone()),
            ),
            GovernanceError::Serialization(e) => (
                StatusCode::BAD_REQUEST,
                "SERIALIZATION_ERROR",
                "Failed to process request/response".to_string(),
                Some(e.to_string()),
            ),
            GovernanceError::Invariant(msg) => {
                tracing::error!(error = %msg, "Governance invariant violated");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PROCESSING_ERROR",
                    "The interaction could not be processed".to_string(),
                    None,
                )
            }
            GovernanceError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for governance operations.
pub type GovernanceResult<T> = Result<T, GovernanceError>;

/// Failure of an external collaborator (LLM or fact-check provider).
///
/// Never surfaced to HTTP callers; the pipeline degrades and records it
/// in the audit trail instead.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("not configured")]
    NotConfigured,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (GovernanceError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (GovernanceError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (GovernanceError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                GovernanceError::Invariant("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
