//! # Parameterized SQL
//!
//! The only path from a request to SQL text. [`SqlWriter`] accepts static
//! text, identifiers that were resolved against the schema snapshot,
//! generated aliases, and bound parameters. There is no method that accepts
//! a runtime string as SQL, so user data can only ever reach the database
//! as a parameter.

use serde::Serialize;

use super::errors::{RestError, RestResult};
use crate::executor::SqlValue;
use crate::schema::{ColumnInfo, TableInfo};

/// SQL text containing only placeholders for values
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SqlTemplate(String);

impl SqlTemplate {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SqlTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered parameter values; `$1` is the first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BoundParams(Vec<SqlValue>);

impl BoundParams {
    pub fn as_slice(&self) -> &[SqlValue] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push(&mut self, value: SqlValue) -> usize {
        self.0.push(value);
        self.0.len()
    }
}

/// How the engine must run a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// Plain SELECT
    Read,
    /// INSERT/UPDATE/DELETE in a transaction; `returning` plans yield rows
    Mutation { returning: bool },
}

/// The only artifact sent to the database
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlan {
    pub sql: SqlTemplate,
    pub params: BoundParams,
    pub result_columns: Vec<String>,
    pub kind: StatementKind,
}

/// A quoted SQL identifier backed by schema metadata or a checked alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident(String);

impl Ident {
    /// `"schema"."table"` for a table from the snapshot
    pub fn table(table: &TableInfo) -> Self {
        Ident(format!("{}.{}", quote(&table.schema), quote(&table.name)))
    }

    /// A column from the snapshot
    pub fn column(column: &ColumnInfo) -> Self {
        Ident(quote(&column.name))
    }

    /// Output name for a projected value.
    ///
    /// Names taken from schema metadata pass as-is; caller-chosen aliases
    /// must look like plain identifiers.
    pub fn output(name: &str, from_schema: bool) -> RestResult<Self> {
        if !from_schema && !is_plain_identifier(name) {
            return Err(RestError::validation(format!(
                "invalid alias '{}'",
                name.chars().take(64).collect::<String>()
            )));
        }
        Ok(Ident(quote(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Generated relation alias (`"t0"`, `"e1"`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alias {
    prefix: &'static str,
    index: usize,
}

impl Alias {
    pub fn table(index: usize) -> Self {
        Self { prefix: "t", index }
    }

    pub fn embed(index: usize) -> Self {
        Self { prefix: "e", index }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// Builds a [`SqlTemplate`] and its [`BoundParams`] together
#[derive(Debug, Default)]
pub struct SqlWriter {
    sql: String,
    params: BoundParams,
}

impl SqlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed SQL text
    pub fn push(&mut self, text: &'static str) -> &mut Self {
        self.sql.push_str(text);
        self
    }

    pub fn push_ident(&mut self, ident: &Ident) -> &mut Self {
        self.sql.push_str(&ident.0);
        self
    }

    pub fn push_alias(&mut self, alias: Alias) -> &mut Self {
        self.sql.push('"');
        self.sql.push_str(alias.prefix);
        self.sql.push_str(&alias.index.to_string());
        self.sql.push('"');
        self
    }

    /// `"t0"."column"`
    pub fn push_column(&mut self, alias: Alias, column: &Ident) -> &mut Self {
        self.push_alias(alias).push(".").push_ident(column)
    }

    /// Bind a value and write its placeholder.
    ///
    /// Decimal values travel as text and are cast server-side.
    pub fn push_param(&mut self, value: SqlValue) -> &mut Self {
        let cast = match &value {
            SqlValue::Numeric(_) => "::text::numeric",
            SqlValue::Array(items) if items.iter().any(|v| matches!(v, SqlValue::Numeric(_))) => {
                "::text[]::numeric[]"
            }
            _ => "",
        };
        let n = self.params.push(value);
        self.sql.push('$');
        self.sql.push_str(&n.to_string());
        self.sql.push_str(cast);
        self
    }

    /// Write items separated by `sep`
    pub fn push_separated<T>(
        &mut self,
        items: impl IntoIterator<Item = T>,
        sep: &'static str,
        mut each: impl FnMut(&mut Self, T) -> RestResult<()>,
    ) -> RestResult<&mut Self> {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.push(sep);
            }
            each(self, item)?;
        }
        Ok(self)
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn finish(self) -> (SqlTemplate, BoundParams) {
        (SqlTemplate(self.sql), self.params)
    }
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    #[test]
    fn test_writer_numbers_params_in_order() {
        let col = ColumnInfo::new("age", ColumnType::Integer);
        let mut w = SqlWriter::new();
        w.push("SELECT 1 FROM x AS ")
            .push_alias(Alias::table(0))
            .push(" WHERE ")
            .push_column(Alias::table(0), &Ident::column(&col))
            .push(" >= ")
            .push_param(SqlValue::Int(18))
            .push(" LIMIT ")
            .push_param(SqlValue::Int(10));
        let (sql, params) = w.finish();
        assert_eq!(
            sql.as_str(),
            "SELECT 1 FROM x AS \"t0\" WHERE \"t0\".\"age\" >= $1 LIMIT $2"
        );
        assert_eq!(params.as_slice(), &[SqlValue::Int(18), SqlValue::Int(10)]);
    }

    #[test]
    fn test_numeric_params_are_cast() {
        let mut w = SqlWriter::new();
        w.push_param(SqlValue::Numeric("1.50".into()));
        let (sql, _) = w.finish();
        assert_eq!(sql.as_str(), "$1::text::numeric");
    }

    #[test]
    fn test_identifier_quoting() {
        let col = ColumnInfo::new("we\"ird", ColumnType::Text);
        assert_eq!(Ident::column(&col).as_str(), "\"we\"\"ird\"");
        let table = TableInfo::new("public", "todos");
        assert_eq!(Ident::table(&table).as_str(), "\"public\".\"todos\"");
    }

    #[test]
    fn test_alias_must_be_plain() {
        assert!(Ident::output("author_name", false).is_ok());
        assert!(Ident::output("x\" FROM secrets --", false).is_err());
        assert!(Ident::output("1abc", false).is_err());
        assert!(Ident::output("Mixed Case", true).is_ok());
    }
}
