//! Versioned schema snapshots
//!
//! A snapshot is an immutable, validated view of the schema at one version.
//! Compilation always runs against exactly one snapshot, so a plan never
//! mixes metadata from two schema versions.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::errors::{SchemaError, SchemaResult};
use super::types::{ColumnInfo, ForeignKeyInfo, TableInfo, TableRef};

/// Read-only schema metadata provider.
///
/// Owned outside the gateway; refreshed by migration/DDL events.
pub trait SchemaOracle: Send + Sync {
    /// All tables known at the current version
    fn list_tables(&self) -> Vec<TableRef>;

    /// Columns of a table, `None` if the table is unknown
    fn get_columns(&self, table: &TableRef) -> Option<Vec<ColumnInfo>>;

    /// Foreign keys owned by a table (child side)
    fn get_foreign_keys(&self, table: &TableRef) -> Vec<ForeignKeyInfo>;

    /// Primary key columns in key order; empty when the table has none
    fn get_primary_key(&self, _table: &TableRef) -> Vec<String> {
        Vec::new()
    }

    /// Current schema version, monotonically increasing
    fn version(&self) -> u64;
}

/// Immutable schema snapshot at one version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSnapshot {
    version: u64,
    tables: BTreeMap<TableRef, TableInfo>,
}

/// On-disk / wire representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub version: u64,
    pub tables: Vec<TableInfo>,
}

impl SchemaSnapshot {
    /// Build a snapshot, validating its structure
    pub fn new(version: u64, tables: Vec<TableInfo>) -> SchemaResult<Self> {
        let mut map = BTreeMap::new();
        for table in tables {
            validate_table(&table)?;
            let key = table.table_ref();
            if map.contains_key(&key) {
                return Err(SchemaError::DuplicateTable(key.to_string()));
            }
            map.insert(key, table);
        }
        Ok(Self {
            version,
            tables: map,
        })
    }

    /// Empty snapshot at version 0
    pub fn empty() -> Self {
        Self {
            version: 0,
            tables: BTreeMap::new(),
        }
    }

    /// Capture the current state of an oracle
    pub fn capture(oracle: &dyn SchemaOracle) -> SchemaResult<Self> {
        let version = oracle.version();
        let mut tables = Vec::new();
        for table_ref in oracle.list_tables() {
            let columns = oracle.get_columns(&table_ref).ok_or_else(|| {
                SchemaError::Introspection(format!(
                    "table {} listed without columns",
                    table_ref
                ))
            })?;
            let mut info = TableInfo::new(table_ref.schema.clone(), table_ref.name.clone());
            info.columns = columns;
            info.primary_key = oracle.get_primary_key(&table_ref);
            info.foreign_keys = oracle.get_foreign_keys(&table_ref);
            tables.push(info);
        }
        Self::new(version, tables)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn table(&self, schema: &str, name: &str) -> Option<&TableInfo> {
        self.tables.get(&TableRef::new(schema, name))
    }

    pub fn table_by_ref(&self, table: &TableRef) -> Option<&TableInfo> {
        self.tables.get(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableInfo> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Foreign keys on other tables that point at `target`
    pub fn referencing(&self, target: &TableRef) -> Vec<(&TableInfo, &ForeignKeyInfo)> {
        let mut out = Vec::new();
        for table in self.tables.values() {
            for fk in &table.foreign_keys {
                if &table.referenced_ref(fk) == target {
                    out.push((table, fk));
                }
            }
        }
        out
    }

    pub fn to_document(&self) -> SnapshotDocument {
        SnapshotDocument {
            version: self.version,
            tables: self.tables.values().cloned().collect(),
        }
    }
}

impl TryFrom<SnapshotDocument> for SchemaSnapshot {
    type Error = SchemaError;

    fn try_from(doc: SnapshotDocument) -> SchemaResult<Self> {
        Self::new(doc.version, doc.tables)
    }
}

impl SchemaOracle for SchemaSnapshot {
    fn list_tables(&self) -> Vec<TableRef> {
        self.tables.keys().cloned().collect()
    }

    fn get_columns(&self, table: &TableRef) -> Option<Vec<ColumnInfo>> {
        self.tables.get(table).map(|t| t.columns.clone())
    }

    fn get_foreign_keys(&self, table: &TableRef) -> Vec<ForeignKeyInfo> {
        self.tables
            .get(table)
            .map(|t| t.foreign_keys.clone())
            .unwrap_or_default()
    }

    fn get_primary_key(&self, table: &TableRef) -> Vec<String> {
        self.tables
            .get(table)
            .map(|t| t.primary_key.clone())
            .unwrap_or_default()
    }

    fn version(&self) -> u64 {
        self.version
    }
}

fn validate_table(table: &TableInfo) -> SchemaResult<()> {
    let qualified = table.table_ref().to_string();

    let mut seen = HashSet::new();
    for column in &table.columns {
        if !seen.insert(column.name.as_str()) {
            return Err(SchemaError::DuplicateColumn {
                table: qualified,
                column: column.name.clone(),
            });
        }
    }

    for pk in &table.primary_key {
        if !seen.contains(pk.as_str()) {
            return Err(SchemaError::InvalidPrimaryKey {
                table: qualified,
                column: pk.clone(),
            });
        }
    }

    for fk in &table.foreign_keys {
        let invalid = |reason: &str| SchemaError::InvalidForeignKey {
            table: qualified.clone(),
            name: fk.name.clone(),
            reason: reason.to_string(),
        };
        if fk.columns.is_empty() {
            return Err(invalid("no columns"));
        }
        if fk.columns.len() != fk.referenced_columns.len() {
            return Err(invalid("column count mismatch"));
        }
        if let Some(missing) = fk.columns.iter().find(|c| !seen.contains(c.as_str())) {
            return Err(invalid(&format!("unknown column {}", missing)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::ColumnType;

    fn users() -> TableInfo {
        TableInfo::new("public", "users")
            .column(ColumnInfo::new("id", ColumnType::Integer).not_null())
            .column(ColumnInfo::new("name", ColumnType::Text))
            .primary_key(&["id"])
    }

    fn posts() -> TableInfo {
        TableInfo::new("public", "posts")
            .column(ColumnInfo::new("id", ColumnType::Integer).not_null())
            .column(ColumnInfo::new("user_id", ColumnType::Integer))
            .primary_key(&["id"])
            .foreign_key("posts_user_id_fkey", &["user_id"], "users", &["id"])
    }

    #[test]
    fn test_snapshot_lookup() {
        let snap = SchemaSnapshot::new(3, vec![users(), posts()]).unwrap();
        assert_eq!(snap.version(), 3);
        assert_eq!(snap.len(), 2);
        assert!(snap.table("public", "users").is_some());
        assert!(snap.table("other", "users").is_none());
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let err = SchemaSnapshot::new(1, vec![users(), users()]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateTable(_)));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let table = users().column(ColumnInfo::new("name", ColumnType::Text));
        let err = SchemaSnapshot::new(1, vec![table]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateColumn { .. }));
    }

    #[test]
    fn test_primary_key_must_exist() {
        let table = users().primary_key(&["uid"]);
        let err = SchemaSnapshot::new(1, vec![table]).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidPrimaryKey { .. }));
    }

    #[test]
    fn test_foreign_key_column_count() {
        let mut table = posts();
        table.foreign_keys[0].referenced_columns.push("extra".into());
        let err = SchemaSnapshot::new(1, vec![users(), table]).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidForeignKey { .. }));
    }

    #[test]
    fn test_referencing_lists_child_tables() {
        let snap = SchemaSnapshot::new(1, vec![users(), posts()]).unwrap();
        let refs = snap.referencing(&TableRef::new("public", "users"));
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].0.name, "posts");
        assert_eq!(refs[0].1.name, "posts_user_id_fkey");
    }

    #[test]
    fn test_capture_from_oracle() {
        let source = SchemaSnapshot::new(7, vec![users(), posts()]).unwrap();
        let captured = SchemaSnapshot::capture(&source).unwrap();
        assert_eq!(captured.version(), 7);
        assert_eq!(captured, source);
        assert_eq!(
            captured
                .get_foreign_keys(&TableRef::new("public", "posts"))
                .len(),
            1
        );
    }
}
