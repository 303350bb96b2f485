//! Driver and pool error types
//!
//! These are what collaborator implementations report. They never reach a
//! caller directly: the engine classifies them into the REST taxonomy.

use std::time::Duration;

use thiserror::Error;

/// Error reported by a database connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// The server rejected a statement
    #[error("database error {sqlstate}: {message}")]
    Database { sqlstate: String, message: String },

    /// The connection is unusable
    #[error("connection closed: {0}")]
    Closed(String),

    /// Parameter encoding, row decoding or protocol failure
    #[error("driver error: {0}")]
    Protocol(String),
}

impl DriverError {
    pub fn database(sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        DriverError::Database {
            sqlstate: sqlstate.into(),
            message: message.into(),
        }
    }

    /// Five-character SQLSTATE, when the server produced one
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            DriverError::Database { sqlstate, .. } => Some(sqlstate),
            _ => None,
        }
    }
}

/// Error reported by a connection pool
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// No connection became free within the wait timeout
    #[error("timed out after {0:?} waiting for a connection")]
    Timeout(Duration),

    /// The pool is shut down
    #[error("pool is closed")]
    Closed,

    /// Opening a new physical connection failed
    #[error("failed to open connection: {0}")]
    Connect(String),
}
