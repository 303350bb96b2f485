//! # Response Envelope
//!
//! `{"data": ..., "error": null}` or `{"data": null, "error": {...}}`.
//! Exactly one side is non-null: success data that serializes to `null` is
//! turned into an internal error rather than sent with a null error.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use super::errors::RestError;

/// Error half of the envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl From<&RestError> for ApiError {
    fn from(err: &RestError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

/// Uniform response envelope
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    data: Option<T>,
    error: Option<ApiError>,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self::with_status(StatusCode::OK, data)
    }

    pub fn with_status(status: StatusCode, data: T) -> Self {
        match serde_json::to_value(&data) {
            Ok(Value::Null) => Self::from_error(&RestError::internal("response data is null")),
            Err(err) => Self::from_error(&RestError::internal(err)),
            Ok(_) => Self {
                data: Some(data),
                error: None,
                status,
            },
        }
    }

    pub fn from_error(err: &RestError) -> Self {
        Self {
            data: None,
            error: Some(ApiError::from(err)),
            status: err.status_code(),
        }
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl<T: Serialize> From<Result<T, RestError>> for ApiResponse<T> {
    fn from(result: Result<T, RestError>) -> Self {
        match result {
            Ok(data) => ApiResponse::ok(data),
            Err(err) => ApiResponse::from_error(&err),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}
