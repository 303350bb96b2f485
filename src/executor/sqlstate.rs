//! SQLSTATE classification
//!
//! | SQLSTATE          | Code                    |
//! |-------------------|-------------------------|
//! | 23505             | UNIQUE_VIOLATION        |
//! | 23503             | FOREIGN_KEY_VIOLATION   |
//! | 23514             | CHECK_VIOLATION         |
//! | 23502, class 22   | VALIDATION_ERROR        |
//! | 42501             | PERMISSION_DENIED       |
//! | 57014             | TIMEOUT                 |
//! | anything else     | INTERNAL_ERROR          |
//!
//! Driver messages are only ever logged, under the correlation id returned
//! with `INTERNAL_ERROR`.

use crate::rest_api::RestError;

use super::errors::{DriverError, PoolError};

pub const UNIQUE_VIOLATION: &str = "23505";
pub const FOREIGN_KEY_VIOLATION: &str = "23503";
pub const CHECK_VIOLATION: &str = "23514";
pub const NOT_NULL_VIOLATION: &str = "23502";
pub const INSUFFICIENT_PRIVILEGE: &str = "42501";
pub const QUERY_CANCELED: &str = "57014";

/// Translate a driver error into the domain taxonomy
pub fn classify(err: &DriverError) -> RestError {
    let Some(state) = err.sqlstate() else {
        return RestError::internal(err);
    };

    match state {
        UNIQUE_VIOLATION => RestError::UniqueViolation,
        FOREIGN_KEY_VIOLATION => RestError::ForeignKeyViolation,
        CHECK_VIOLATION => RestError::CheckViolation,
        NOT_NULL_VIOLATION => RestError::validation("a required value is missing"),
        INSUFFICIENT_PRIVILEGE => RestError::PermissionDenied,
        QUERY_CANCELED => RestError::Timeout,
        s if s.starts_with("22") => RestError::validation("invalid value for column type"),
        _ => RestError::internal(err),
    }
}

/// Translate a pool checkout failure
pub fn classify_pool(err: &PoolError) -> RestError {
    match err {
        PoolError::Timeout(_) => RestError::Timeout,
        other => RestError::internal(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_known_states() {
        let code = |s: &str| classify(&DriverError::database(s, "boom")).code();
        assert_eq!(code("23505"), "UNIQUE_VIOLATION");
        assert_eq!(code("23503"), "FOREIGN_KEY_VIOLATION");
        assert_eq!(code("23514"), "CHECK_VIOLATION");
        assert_eq!(code("23502"), "VALIDATION_ERROR");
        assert_eq!(code("22P02"), "VALIDATION_ERROR");
        assert_eq!(code("42501"), "PERMISSION_DENIED");
        assert_eq!(code("57014"), "TIMEOUT");
    }

    #[test]
    fn test_unknown_state_is_sanitized() {
        let err = classify(&DriverError::database(
            "42P01",
            "relation \"payroll\" does not exist",
        ));
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert!(!err.to_string().contains("payroll"));
        assert!(err.details().is_some());
    }

    #[test]
    fn test_pool_timeout() {
        assert_eq!(
            classify_pool(&PoolError::Timeout(Duration::from_millis(5))).code(),
            "TIMEOUT"
        );
        assert_eq!(classify_pool(&PoolError::Closed).code(), "INTERNAL_ERROR");
    }
}
