//! # Mutation Pipeline
//!
//! INSERT, UPDATE and DELETE compilation. UPDATE and DELETE refuse to
//! compile without at least one filter. With `return=representation` the
//! statement runs inside a CTE and the returned rows are projected exactly
//! like a read, embeds included:
//!
//! ```text
//! WITH "m" AS (UPDATE ... RETURNING *) SELECT ... FROM "m" AS "t0"
//! ```

use serde_json::{Map, Value};

use crate::executor::SqlValue;
use crate::schema::{coerce_json, ColumnInfo, TableInfo};

use super::builder::{emit_joins, emit_select_list, Projection, QueryBuilder};
use super::errors::{RestError, RestResult};
use super::prefer::ReturnPreference;
use super::request::QueryRequest;
use super::sql::{Alias, Ident, QueryPlan, SqlWriter, StatementKind};

impl<'s> QueryBuilder<'s> {
    /// Compile an INSERT of one object or a batch of objects
    pub fn compile_insert(
        &self,
        req: &QueryRequest,
        body: &Value,
        returning: ReturnPreference,
        max_batch_rows: usize,
    ) -> RestResult<QueryPlan> {
        let table = self.table(req.schema(), req.table())?;
        if !req.filters().is_empty() {
            return Err(RestError::validation("filters are not allowed on inserts"));
        }

        let rows: Vec<&Map<String, Value>> = match body {
            Value::Object(obj) => vec![obj],
            Value::Array(items) => {
                if items.is_empty() {
                    return Err(RestError::validation("insert batch is empty"));
                }
                if items.len() > max_batch_rows {
                    return Err(RestError::validation(format!(
                        "insert batch exceeds {} rows",
                        max_batch_rows
                    )));
                }
                items
                    .iter()
                    .map(|item| {
                        item.as_object().ok_or_else(|| {
                            RestError::validation("insert batch items must be objects")
                        })
                    })
                    .collect::<RestResult<_>>()?
            }
            _ => {
                return Err(RestError::validation(
                    "insert body must be an object or an array of objects",
                ))
            }
        };

        // Union of keys in first-seen order
        let mut columns: Vec<&ColumnInfo> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if columns.iter().any(|c| &c.name == key) {
                    continue;
                }
                let column = table
                    .find_column(key)
                    .ok_or_else(|| RestError::unknown_column(&table.name, key))?;
                columns.push(column);
            }
        }
        if columns.is_empty() && rows.len() > 1 {
            return Err(RestError::validation("insert batch rows have no columns"));
        }

        let mut w = SqlWriter::new();
        let projection = self.begin_returning(&mut w, table, req, returning)?;

        w.push("INSERT INTO ")
            .push_ident(&Ident::table(table))
            .push(" AS ")
            .push_alias(Alias::table(0));
        if columns.is_empty() {
            w.push(" DEFAULT VALUES");
        } else {
            w.push(" (");
            w.push_separated(&columns, ", ", |w, c| {
                w.push_ident(&Ident::column(c));
                Ok(())
            })?;
            w.push(") VALUES ");
            w.push_separated(&rows, ", ", |w, row| {
                w.push("(");
                w.push_separated(&columns, ", ", |w, column| {
                    match row.get(&column.name) {
                        None => {
                            w.push("DEFAULT");
                        }
                        Some(value) => {
                            w.push_param(coerce_body_value(column, value)?);
                        }
                    }
                    Ok(())
                })?;
                w.push(")");
                Ok(())
            })?;
        }

        self.finish_mutation(w, projection)
    }

    /// Compile an UPDATE; zero filters is `UNSAFE_MUTATION`
    pub fn compile_update(
        &self,
        req: &QueryRequest,
        body: &Value,
        returning: ReturnPreference,
    ) -> RestResult<QueryPlan> {
        if req.filters().is_empty() {
            return Err(RestError::UnsafeMutation("UPDATE"));
        }
        let table = self.table(req.schema(), req.table())?;

        let fields = match body {
            Value::Object(obj) if !obj.is_empty() => obj,
            Value::Object(_) => return Err(RestError::validation("update body is empty")),
            _ => return Err(RestError::validation("update body must be an object")),
        };
        let mut assignments = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            let column = table
                .find_column(key)
                .ok_or_else(|| RestError::unknown_column(&table.name, key))?;
            assignments.push((column, coerce_body_value(column, value)?));
        }

        let mut w = SqlWriter::new();
        let projection = self.begin_returning(&mut w, table, req, returning)?;

        let alias = Alias::table(0);
        w.push("UPDATE ")
            .push_ident(&Ident::table(table))
            .push(" AS ")
            .push_alias(alias)
            .push(" SET ");
        w.push_separated(assignments, ", ", |w, (column, value)| {
            w.push_ident(&Ident::column(column))
                .push(" = ")
                .push_param(value);
            Ok(())
        })?;
        self.emit_where(&mut w, table, alias, req.filters())?;

        self.finish_mutation(w, projection)
    }

    /// Compile a DELETE; zero filters is `UNSAFE_MUTATION`
    pub fn compile_delete(
        &self,
        req: &QueryRequest,
        returning: ReturnPreference,
    ) -> RestResult<QueryPlan> {
        if req.filters().is_empty() {
            return Err(RestError::UnsafeMutation("DELETE"));
        }
        let table = self.table(req.schema(), req.table())?;

        let mut w = SqlWriter::new();
        let projection = self.begin_returning(&mut w, table, req, returning)?;

        let alias = Alias::table(0);
        w.push("DELETE FROM ")
            .push_ident(&Ident::table(table))
            .push(" AS ")
            .push_alias(alias);
        self.emit_where(&mut w, table, alias, req.filters())?;

        self.finish_mutation(w, projection)
    }

    /// Resolve the representation projection and open the CTE
    fn begin_returning(
        &self,
        w: &mut SqlWriter,
        table: &'s TableInfo,
        req: &QueryRequest,
        returning: ReturnPreference,
    ) -> RestResult<Option<Projection<'s>>> {
        match returning {
            ReturnPreference::Minimal => Ok(None),
            ReturnPreference::Representation => {
                let mut next_alias = 0;
                let projection =
                    self.resolve_projection(table, req.select(), req.embeds(), &mut next_alias, 0)?;
                w.push("WITH \"m\" AS (");
                Ok(Some(projection))
            }
        }
    }

    fn finish_mutation(
        &self,
        mut w: SqlWriter,
        projection: Option<Projection<'s>>,
    ) -> RestResult<QueryPlan> {
        let (result_columns, returning) = match projection {
            None => (Vec::new(), false),
            Some(projection) => {
                w.push(" RETURNING *) SELECT ");
                emit_select_list(&mut w, &projection)?;
                w.push(" FROM \"m\" AS ").push_alias(projection.alias);
                emit_joins(&mut w, &projection)?;
                (projection.output_names(), true)
            }
        };
        let (sql, params) = w.finish();
        Ok(QueryPlan {
            sql,
            params,
            result_columns,
            kind: StatementKind::Mutation { returning },
        })
    }
}

fn coerce_body_value(column: &ColumnInfo, value: &Value) -> RestResult<SqlValue> {
    if value.is_null() && !column.nullable {
        return Err(RestError::validation(format!(
            "'{}' cannot be null",
            column.name
        )));
    }
    coerce_json(value, &column.column_type)
        .map_err(|e| RestError::validation(format!("{}: {}", column.name, e)))
}
