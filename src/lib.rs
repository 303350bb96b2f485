//! aerogate - a schema-driven REST gateway over Postgres
//!
//! Untrusted query parameters and JSON bodies are compiled into
//! parameterized SQL against a versioned schema snapshot and executed on a
//! pooled connection carrying the caller's identity, so row-level security
//! stays with the database.

pub mod auth;
pub mod cli;
pub mod config;
pub mod executor;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod rest_api;
pub mod schema;

pub use config::GatewayConfig;
pub use rest_api::{ApiResponse, RestApi, RestError, RestRequest};
