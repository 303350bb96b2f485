//! # Schema Errors
//!
//! Error types for loading and maintaining schema snapshots.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Schema metadata errors
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Snapshot file could not be read
    #[error("Failed to read schema file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot file is not valid JSON for a snapshot
    #[error("Malformed schema file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The same table appears twice in one snapshot
    #[error("Duplicate table in snapshot: {0}")]
    DuplicateTable(String),

    /// A table declares the same column twice
    #[error("Duplicate column {column} in table {table}")]
    DuplicateColumn { table: String, column: String },

    /// Primary key references a column the table does not have
    #[error("Primary key of {table} references unknown column {column}")]
    InvalidPrimaryKey { table: String, column: String },

    /// Foreign key is structurally invalid
    #[error("Invalid foreign key {name} on {table}: {reason}")]
    InvalidForeignKey {
        table: String,
        name: String,
        reason: String,
    },

    /// Introspection against a live database failed
    #[error("Schema introspection failed: {0}")]
    Introspection(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offender() {
        let err = SchemaError::InvalidForeignKey {
            table: "public.posts".to_string(),
            name: "posts_user_id_fkey".to_string(),
            reason: "column count mismatch".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("posts_user_id_fkey"));
        assert!(msg.contains("public.posts"));
    }
}
