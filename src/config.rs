//! Gateway Configuration
//!
//! Loaded from `aerogate.json`. Every field has a default, so an empty
//! object is a valid configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rest_api::Limits;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Token verification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtSettings {
    /// HS256 shared secret
    #[serde(default)]
    pub secret: String,

    #[serde(default)]
    pub audience: Option<String>,

    #[serde(default)]
    pub issuer: Option<String>,

    /// Claim holding the database role (default: "role")
    #[serde(default = "default_role_claim")]
    pub role_claim: String,

    /// Role for tokens that carry no role claim (default: "authenticated")
    #[serde(default = "default_authenticated_role")]
    pub default_role: String,
}

fn default_role_claim() -> String {
    "role".to_string()
}

fn default_authenticated_role() -> String {
    "authenticated".to_string()
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            audience: None,
            issuer: None,
            role_claim: default_role_claim(),
            default_role: default_authenticated_role(),
        }
    }
}

/// Postgres connection settings, used by the `postgres` feature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_database_url() -> String {
    "postgres://postgres@localhost:5432/postgres".to_string()
}

fn default_pool_size() -> usize {
    16
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            pool_size: default_pool_size(),
        }
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Schema used when a request names none (default: "public")
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Schemas requests may target (default: ["public"])
    #[serde(default = "default_exposed_schemas")]
    pub exposed_schemas: Vec<String>,

    #[serde(default = "default_max_limit")]
    pub max_limit: u64,

    #[serde(default = "default_default_limit")]
    pub default_limit: u64,

    #[serde(default = "default_max_embed_depth")]
    pub max_embed_depth: usize,

    #[serde(default = "default_max_batch_rows")]
    pub max_batch_rows: usize,

    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,

    #[serde(default = "default_pool_wait_timeout_ms")]
    pub pool_wait_timeout_ms: u64,

    /// Reject requests without a bearer token
    #[serde(default)]
    pub require_identity: bool,

    /// Role bound for callers without a token (default: "anon")
    #[serde(default = "default_anon_role")]
    pub anon_role: String,

    /// Read back session settings after reset before reusing a connection
    #[serde(default = "default_true")]
    pub verify_session_reset: bool,

    /// Issue `SET ROLE` to the caller's role on bind
    #[serde(default = "default_true")]
    pub switch_role: bool,

    #[serde(default)]
    pub jwt: JwtSettings,

    #[serde(default)]
    pub database: DatabaseSettings,
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_exposed_schemas() -> Vec<String> {
    vec![default_schema()]
}

fn default_max_limit() -> u64 {
    1000
}

fn default_default_limit() -> u64 {
    100
}

fn default_max_embed_depth() -> usize {
    3
}

fn default_max_batch_rows() -> usize {
    500
}

fn default_statement_timeout_ms() -> u64 {
    5000
}

fn default_pool_wait_timeout_ms() -> u64 {
    2000
}

fn default_anon_role() -> String {
    "anon".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            exposed_schemas: default_exposed_schemas(),
            max_limit: default_max_limit(),
            default_limit: default_default_limit(),
            max_embed_depth: default_max_embed_depth(),
            max_batch_rows: default_max_batch_rows(),
            statement_timeout_ms: default_statement_timeout_ms(),
            pool_wait_timeout_ms: default_pool_wait_timeout_ms(),
            require_identity: false,
            anon_role: default_anon_role(),
            verify_session_reset: true,
            switch_role: true,
            jwt: JwtSettings::default(),
            database: DatabaseSettings::default(),
        }
    }
}

impl GatewayConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> ConfigResult<Self> {
        let config: GatewayConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_limit > self.max_limit {
            return Err(ConfigError::Invalid(format!(
                "default_limit {} exceeds max_limit {}",
                self.default_limit, self.max_limit
            )));
        }
        if self.database.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be positive".into()));
        }
        if self.max_batch_rows == 0 {
            return Err(ConfigError::Invalid(
                "max_batch_rows must be positive".into(),
            ));
        }
        if !self.exposed_schemas.contains(&self.schema) {
            return Err(ConfigError::Invalid(format!(
                "default schema '{}' is not exposed",
                self.schema
            )));
        }
        Ok(())
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_limit: self.max_limit,
            default_limit: self.default_limit,
        }
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }

    pub fn pool_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_wait_timeout_ms)
    }
}
