//! Schema snapshot loader
//!
//! Snapshot files are JSON documents:
//!
//! ```json
//! { "version": 1, "tables": [ { "schema": "public", "name": "todos", "columns": [...] } ] }
//! ```

use std::fs;
use std::path::Path;

use super::errors::{SchemaError, SchemaResult};
use super::snapshot::{SchemaSnapshot, SnapshotDocument};

/// Loads snapshot files from disk
pub struct SchemaLoader;

impl SchemaLoader {
    /// Load and validate a snapshot file
    pub fn load_file(path: &Path) -> SchemaResult<SchemaSnapshot> {
        let content = fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let doc: SnapshotDocument =
            serde_json::from_str(&content).map_err(|source| SchemaError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;

        let snapshot = SchemaSnapshot::try_from(doc)?;
        tracing::info!(
            event = "SCHEMA_LOADED",
            path = %path.display(),
            version = snapshot.version(),
            tables = snapshot.len(),
        );
        Ok(snapshot)
    }

    /// Parse a snapshot from an in-memory JSON string
    pub fn from_json(json: &str) -> SchemaResult<SchemaSnapshot> {
        let doc: SnapshotDocument =
            serde_json::from_str(json).map_err(|source| SchemaError::Malformed {
                path: "<memory>".into(),
                source,
            })?;
        SchemaSnapshot::try_from(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TODOS: &str = r#"{
        "version": 5,
        "tables": [
            {
                "schema": "public",
                "name": "todos",
                "columns": [
                    {"name": "id", "type": "uuid", "nullable": false, "has_default": true},
                    {"name": "title", "type": "text", "nullable": false},
                    {"name": "priority", "type": "int4"}
                ],
                "primary_key": ["id"]
            }
        ]
    }"#;

    #[test]
    fn test_load_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(TODOS.as_bytes()).unwrap();

        let snap = SchemaLoader::load_file(file.path()).unwrap();
        assert_eq!(snap.version(), 5);
        let todos = snap.table("public", "todos").unwrap();
        assert_eq!(todos.columns.len(), 3);
        assert!(todos.find_column("id").unwrap().has_default);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SchemaLoader::load_file(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, SchemaError::Io { .. }));
    }

    #[test]
    fn test_malformed_json() {
        let err = SchemaLoader::from_json("{ not json").unwrap_err();
        assert!(matches!(err, SchemaError::Malformed { .. }));
    }
}
