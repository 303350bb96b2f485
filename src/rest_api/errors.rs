//! # REST API Errors
//!
//! The domain error taxonomy. Every failure a caller can observe maps to one
//! of these codes; raw driver text never appears in a message.

use axum::http::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::AuthError;

/// Result type for REST operations
pub type RestResult<T> = Result<T, RestError>;

/// REST API errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RestError {
    // ==================
    // Compile-time (no SQL issued)
    // ==================
    /// Malformed parameter, body, or value that does not fit its column
    #[error("{0}")]
    Validation(String),

    /// Column not present in the schema snapshot
    #[error("Column '{column}' does not exist on '{table}'")]
    UnknownColumn { table: String, column: String },

    /// Operator outside the supported set
    #[error("Unknown operator '{0}'")]
    UnknownOperator(String),

    /// More than one foreign key connects two embedded tables
    #[error("More than one relationship between '{from}' and '{to}'; add a hint")]
    AmbiguousRelationship {
        from: String,
        to: String,
        candidates: Vec<String>,
    },

    /// UPDATE/DELETE without a single filter
    #[error("{0} requires at least one filter")]
    UnsafeMutation(&'static str),

    /// Identity missing or unusable
    #[error("{0}")]
    AuthContext(String),

    /// Compile raced a schema refresh
    #[error("Schema changed during compilation")]
    StaleSchema { snapshot: u64, current: u64 },

    // ==================
    // Execution-time (classified from SQLSTATE)
    // ==================
    #[error("Duplicate key value violates a unique constraint")]
    UniqueViolation,

    #[error("Referenced row does not exist or is still referenced")]
    ForeignKeyViolation,

    #[error("Value violates a check constraint")]
    CheckViolation,

    /// Row-level security or grant rejected the statement
    #[error("Permission denied")]
    PermissionDenied,

    /// Statement timeout or pool checkout timeout
    #[error("Request timed out")]
    Timeout,

    /// Caller aborted the request
    #[error("Request cancelled")]
    Cancelled,

    // ==================
    // Server Errors (5xx)
    // ==================
    /// Unclassified failure; details are only in the logs
    #[error("Internal error")]
    Internal { correlation_id: Uuid },
}

impl RestError {
    pub fn validation(msg: impl Into<String>) -> Self {
        RestError::Validation(msg.into())
    }

    pub fn unknown_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        RestError::UnknownColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Log `detail` under a fresh correlation id and return the sanitized error
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        let correlation_id = Uuid::new_v4();
        tracing::error!(
            event = "INTERNAL_ERROR",
            correlation_id = %correlation_id,
            detail = %detail,
        );
        RestError::Internal { correlation_id }
    }

    /// Wire code
    pub fn code(&self) -> &'static str {
        match self {
            RestError::Validation(_) => "VALIDATION_ERROR",
            RestError::UnknownColumn { .. } => "UNKNOWN_COLUMN",
            RestError::UnknownOperator(_) => "UNKNOWN_OPERATOR",
            RestError::AmbiguousRelationship { .. } => "AMBIGUOUS_RELATIONSHIP",
            RestError::UnsafeMutation(_) => "UNSAFE_MUTATION",
            RestError::AuthContext(_) => "AUTH_CONTEXT_ERROR",
            RestError::StaleSchema { .. } => "STALE_SCHEMA",
            RestError::UniqueViolation => "UNIQUE_VIOLATION",
            RestError::ForeignKeyViolation => "FOREIGN_KEY_VIOLATION",
            RestError::CheckViolation => "CHECK_VIOLATION",
            RestError::PermissionDenied => "PERMISSION_DENIED",
            RestError::Timeout => "TIMEOUT",
            RestError::Cancelled => "CANCELLED",
            RestError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for the outer HTTP layer
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            RestError::Validation(_)
            | RestError::UnknownColumn { .. }
            | RestError::UnknownOperator(_)
            | RestError::UnsafeMutation(_)
            | RestError::CheckViolation => StatusCode::BAD_REQUEST,

            RestError::AmbiguousRelationship { .. } => StatusCode::MULTIPLE_CHOICES,
            RestError::AuthContext(_) => StatusCode::UNAUTHORIZED,
            RestError::PermissionDenied => StatusCode::FORBIDDEN,

            // 409 Conflict
            RestError::UniqueViolation | RestError::ForeignKeyViolation => StatusCode::CONFLICT,

            // Client closed request
            RestError::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT)
            }

            RestError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            RestError::StaleSchema { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RestError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Structured details for the error envelope
    pub fn details(&self) -> Option<Value> {
        match self {
            RestError::UnknownColumn { table, column } => {
                Some(json!({ "table": table, "column": column }))
            }
            RestError::AmbiguousRelationship { candidates, .. } => {
                Some(json!({ "candidates": candidates }))
            }
            RestError::StaleSchema { snapshot, current } => {
                Some(json!({ "snapshot_version": snapshot, "current_version": current }))
            }
            RestError::Internal { correlation_id } => {
                Some(json!({ "correlation_id": correlation_id.to_string() }))
            }
            _ => None,
        }
    }

    /// Raised before any SQL reached the database
    pub fn is_compile_time(&self) -> bool {
        matches!(
            self,
            RestError::Validation(_)
                | RestError::UnknownColumn { .. }
                | RestError::UnknownOperator(_)
                | RestError::AmbiguousRelationship { .. }
                | RestError::UnsafeMutation(_)
                | RestError::StaleSchema { .. }
        )
    }
}

impl From<AuthError> for RestError {
    fn from(err: AuthError) -> Self {
        RestError::AuthContext(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            RestError::validation("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(RestError::UniqueViolation.status_code(), StatusCode::CONFLICT);
        assert_eq!(RestError::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(RestError::Cancelled.status_code().as_u16(), 499);
    }

    #[test]
    fn test_internal_carries_correlation_id() {
        let err = RestError::internal("relation \"secret_table\" does not exist");
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert!(!err.to_string().contains("secret_table"));
        let details = err.details().unwrap();
        assert!(details["correlation_id"].as_str().is_some());
    }

    #[test]
    fn test_auth_error_propagation() {
        let rest_err = RestError::from(AuthError::TokenExpired);
        assert_eq!(rest_err.code(), "AUTH_CONTEXT_ERROR");
        assert_eq!(rest_err.status_code(), StatusCode::UNAUTHORIZED);
    }
}
