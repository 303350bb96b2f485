//! # Auth Errors
//!
//! Error types for identity resolution. All of them surface to callers as
//! `AUTH_CONTEXT_ERROR`; the variant only decides the message.

use thiserror::Error;

/// Result type for auth operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Identity resolution errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No bearer token and the gateway requires one
    #[error("Authentication required")]
    MissingToken,

    /// The token resolved to no identity
    #[error("Token does not identify a caller")]
    UnknownIdentity,

    // ==================
    // JWT Errors
    // ==================
    /// JWT token is malformed
    #[error("Malformed token")]
    MalformedToken,

    /// JWT token has expired
    #[error("Token expired")]
    TokenExpired,

    /// JWT signature is invalid
    #[error("Invalid token signature")]
    InvalidSignature,

    /// Audience, issuer or role claim did not check out
    #[error("Invalid token claims: {0}")]
    InvalidClaims(String),
}

impl AuthError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::MalformedToken => 400,
            AuthError::MissingToken
            | AuthError::UnknownIdentity
            | AuthError::TokenExpired
            | AuthError::InvalidSignature
            | AuthError::InvalidClaims(_) => 401,
        }
    }
}
