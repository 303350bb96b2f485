//! Schema metadata types
//!
//! Tables, columns and foreign keys as reported by the schema oracle.
//! Column types are folded into a closed model; anything the gateway has no
//! dedicated handling for is kept as `Other` and compared as text.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Column data type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColumnType {
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Numeric,
    Boolean,
    Text,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Json,
    Jsonb,
    TsVector,
    Bytea,
    /// Array of the element type
    Array(Box<ColumnType>),
    /// Enums, domains, citext, network types...
    Other(String),
}

impl ColumnType {
    /// Parse a Postgres type name (`int4`, `character varying`, `text[]`, `_uuid`)
    pub fn from_pg_name(name: &str) -> Self {
        let name = name.trim();
        if let Some(inner) = name.strip_suffix("[]") {
            return ColumnType::Array(Box::new(Self::from_pg_name(inner)));
        }
        if let Some(inner) = name.strip_prefix('_') {
            return ColumnType::Array(Box::new(Self::from_pg_name(inner)));
        }

        // Strip length/precision modifiers: varchar(255), numeric(10,2)
        let base = match name.find('(') {
            Some(idx) => name[..idx].trim_end(),
            None => name,
        };

        match base.to_ascii_lowercase().as_str() {
            "smallint" | "int2" | "smallserial" => ColumnType::SmallInt,
            "integer" | "int" | "int4" | "serial" => ColumnType::Integer,
            "bigint" | "int8" | "bigserial" => ColumnType::BigInt,
            "real" | "float4" => ColumnType::Real,
            "double precision" | "float8" => ColumnType::Double,
            "numeric" | "decimal" => ColumnType::Numeric,
            "boolean" | "bool" => ColumnType::Boolean,
            "text" | "varchar" | "character varying" | "char" | "character" | "bpchar"
            | "name" => ColumnType::Text,
            "uuid" => ColumnType::Uuid,
            "date" => ColumnType::Date,
            "time" | "time without time zone" => ColumnType::Time,
            "timestamp" | "timestamp without time zone" => ColumnType::Timestamp,
            "timestamptz" | "timestamp with time zone" => ColumnType::TimestampTz,
            "json" => ColumnType::Json,
            "jsonb" => ColumnType::Jsonb,
            "tsvector" => ColumnType::TsVector,
            "bytea" => ColumnType::Bytea,
            _ => ColumnType::Other(name.to_string()),
        }
    }

    /// Canonical Postgres name
    pub fn pg_name(&self) -> String {
        match self {
            ColumnType::SmallInt => "int2".to_string(),
            ColumnType::Integer => "int4".to_string(),
            ColumnType::BigInt => "int8".to_string(),
            ColumnType::Real => "float4".to_string(),
            ColumnType::Double => "float8".to_string(),
            ColumnType::Numeric => "numeric".to_string(),
            ColumnType::Boolean => "bool".to_string(),
            ColumnType::Text => "text".to_string(),
            ColumnType::Uuid => "uuid".to_string(),
            ColumnType::Date => "date".to_string(),
            ColumnType::Time => "time".to_string(),
            ColumnType::Timestamp => "timestamp".to_string(),
            ColumnType::TimestampTz => "timestamptz".to_string(),
            ColumnType::Json => "json".to_string(),
            ColumnType::Jsonb => "jsonb".to_string(),
            ColumnType::TsVector => "tsvector".to_string(),
            ColumnType::Bytea => "bytea".to_string(),
            ColumnType::Array(inner) => format!("{}[]", inner.pg_name()),
            ColumnType::Other(name) => name.clone(),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::SmallInt | ColumnType::Integer | ColumnType::BigInt
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer()
            || matches!(
                self,
                ColumnType::Real | ColumnType::Double | ColumnType::Numeric
            )
    }

    pub fn is_json(&self) -> bool {
        matches!(self, ColumnType::Json | ColumnType::Jsonb)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ColumnType::Text)
    }

    /// Element type for arrays
    pub fn element(&self) -> Option<&ColumnType> {
        match self {
            ColumnType::Array(inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<String> for ColumnType {
    fn from(name: String) -> Self {
        ColumnType::from_pg_name(&name)
    }
}

impl From<ColumnType> for String {
    fn from(ty: ColumnType) -> Self {
        ty.pg_name()
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pg_name())
    }
}

/// Column metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,

    #[serde(rename = "type")]
    pub column_type: ColumnType,

    #[serde(default = "default_nullable")]
    pub nullable: bool,

    /// Column has a server-side default (serial, now(), gen_random_uuid())
    #[serde(default)]
    pub has_default: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            has_default: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }
}

/// Foreign key: child columns on the owning table reference parent columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    /// Constraint name, usable as an embed hint
    pub name: String,

    pub columns: Vec<String>,

    /// Referenced schema; empty means same schema as the owning table
    #[serde(default)]
    pub referenced_schema: String,

    pub referenced_table: String,

    pub referenced_columns: Vec<String>,
}

/// Schema-qualified table name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Table metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnInfo>,

    #[serde(default)]
    pub primary_key: Vec<String>,

    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

impl TableInfo {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn foreign_key(
        mut self,
        name: &str,
        columns: &[&str],
        referenced_table: &str,
        referenced_columns: &[&str],
    ) -> Self {
        self.foreign_keys.push(ForeignKeyInfo {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            referenced_schema: String::new(),
            referenced_table: referenced_table.to_string(),
            referenced_columns: referenced_columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef::new(self.schema.clone(), self.name.clone())
    }

    /// Look up a column by exact name
    pub fn find_column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Schema the foreign key points into
    pub fn referenced_ref(&self, fk: &ForeignKeyInfo) -> TableRef {
        let schema = if fk.referenced_schema.is_empty() {
            self.schema.clone()
        } else {
            fk.referenced_schema.clone()
        };
        TableRef::new(schema, fk.referenced_table.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pg_type_names() {
        assert_eq!(ColumnType::from_pg_name("int4"), ColumnType::Integer);
        assert_eq!(
            ColumnType::from_pg_name("character varying(255)"),
            ColumnType::Text
        );
        assert_eq!(
            ColumnType::from_pg_name("timestamp with time zone"),
            ColumnType::TimestampTz
        );
        assert_eq!(
            ColumnType::from_pg_name("_text"),
            ColumnType::Array(Box::new(ColumnType::Text))
        );
        assert_eq!(
            ColumnType::from_pg_name("uuid[]"),
            ColumnType::Array(Box::new(ColumnType::Uuid))
        );
        assert_eq!(
            ColumnType::from_pg_name("todo_status"),
            ColumnType::Other("todo_status".to_string())
        );
    }

    #[test]
    fn test_column_type_serde_uses_pg_names() {
        let col: ColumnInfo =
            serde_json::from_str(r#"{"name": "tags", "type": "text[]"}"#).unwrap();
        assert_eq!(col.column_type, ColumnType::Array(Box::new(ColumnType::Text)));
        assert!(col.nullable);
        assert!(!col.has_default);

        let json = serde_json::to_value(&col).unwrap();
        assert_eq!(json["type"], "text[]");
    }

    #[test]
    fn test_referenced_schema_defaults_to_owner() {
        let posts = TableInfo::new("public", "posts").foreign_key(
            "posts_user_id_fkey",
            &["user_id"],
            "users",
            &["id"],
        );
        let fk = &posts.foreign_keys[0];
        assert_eq!(posts.referenced_ref(fk), TableRef::new("public", "users"));
    }
}
