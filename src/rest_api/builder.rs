//! # Query Builder
//!
//! Compiles a [`QueryRequest`] into a [`QueryPlan`] against one schema
//! snapshot. Every identifier is resolved against the snapshot before it is
//! written; every value is bound as a parameter.
//!
//! Read shape:
//!
//! ```text
//! SELECT "t0"."id" AS "id", ... FROM "public"."posts" AS "t0"
//!   LEFT JOIN "public"."users" AS "t1" ON "t1"."id" = "t0"."user_id"
//!   WHERE ... ORDER BY ... LIMIT $n OFFSET $m
//! ```

use std::collections::HashSet;

use crate::executor::SqlValue;
use crate::schema::{
    coerce_text, ColumnInfo, ColumnType, SchemaOracle, SchemaSnapshot, TableInfo,
};

use super::embed::{Cardinality, RelationshipResolver, Relationship};
use super::errors::{RestError, RestResult};
use super::filter::{FilterExpression, FilterOperator, FilterValue, IsTarget, Scalar};
use super::parser::split_list;
use super::request::{ColumnSpec, Direction, EmbedSpec, NullsOrder, OrderSpec, QueryRequest};
use super::sql::{Alias, Ident, QueryPlan, SqlWriter, StatementKind};

/// A table's resolved projection
#[derive(Debug)]
pub(crate) struct Projection<'s> {
    pub table: &'s TableInfo,
    pub alias: Alias,
    pub columns: Vec<(&'s ColumnInfo, Ident)>,
    pub embeds: Vec<ResolvedEmbed<'s>>,
    outputs: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct ResolvedEmbed<'s> {
    pub output: Ident,
    pub relationship: Relationship<'s>,
    pub projection: Projection<'s>,
}

impl Projection<'_> {
    /// Output names in projection order
    pub fn output_names(&self) -> Vec<String> {
        self.outputs.clone()
    }
}

/// Compiles requests against a fixed snapshot
#[derive(Debug)]
pub struct QueryBuilder<'s> {
    snapshot: &'s SchemaSnapshot,
    resolver: RelationshipResolver<'s>,
}

impl<'s> QueryBuilder<'s> {
    /// Bind a builder to `snapshot`, rejecting it if the oracle has moved on
    pub fn for_snapshot(
        snapshot: &'s SchemaSnapshot,
        oracle: &dyn SchemaOracle,
        max_embed_depth: usize,
    ) -> RestResult<Self> {
        let current = oracle.version();
        if snapshot.version() < current {
            return Err(RestError::StaleSchema {
                snapshot: snapshot.version(),
                current,
            });
        }
        Ok(Self {
            snapshot,
            resolver: RelationshipResolver::new(snapshot, max_embed_depth),
        })
    }

    pub fn snapshot(&self) -> &'s SchemaSnapshot {
        self.snapshot
    }

    pub(crate) fn table(&self, schema: &str, name: &str) -> RestResult<&'s TableInfo> {
        self.snapshot
            .table(schema, name)
            .ok_or_else(|| RestError::validation(format!("no table '{}'", name)))
    }

    /// Compile a read
    pub fn compile_read(&self, req: &QueryRequest) -> RestResult<QueryPlan> {
        let table = self.table(req.schema(), req.table())?;
        let mut next_alias = 0;
        let projection =
            self.resolve_projection(table, req.select(), req.embeds(), &mut next_alias, 0)?;

        let mut w = SqlWriter::new();
        w.push("SELECT ");
        emit_select_list(&mut w, &projection)?;
        w.push(" FROM ")
            .push_ident(&Ident::table(table))
            .push(" AS ")
            .push_alias(projection.alias);
        emit_joins(&mut w, &projection)?;
        self.emit_where(&mut w, table, projection.alias, req.filters())?;
        emit_order(&mut w, table, projection.alias, req.order())?;

        let page = req.pagination();
        w.push(" LIMIT ")
            .push_param(SqlValue::Int(to_i64(page.limit())))
            .push(" OFFSET ")
            .push_param(SqlValue::Int(to_i64(page.offset())));

        let (sql, params) = w.finish();
        Ok(QueryPlan {
            sql,
            params,
            result_columns: projection.output_names(),
            kind: StatementKind::Read,
        })
    }

    /// Resolve select/embeds into a projection tree, assigning aliases
    pub(crate) fn resolve_projection(
        &self,
        table: &'s TableInfo,
        select: &[ColumnSpec],
        embeds: &[EmbedSpec],
        next_alias: &mut usize,
        depth: usize,
    ) -> RestResult<Projection<'s>> {
        let alias = Alias::table(*next_alias);
        *next_alias += 1;

        let mut seen = HashSet::new();
        let mut outputs = Vec::new();
        let mut claim = |name: &str| -> RestResult<()> {
            if !seen.insert(name.to_string()) {
                return Err(RestError::validation(format!(
                    "'{}' selected more than once",
                    name
                )));
            }
            outputs.push(name.to_string());
            Ok(())
        };

        let mut columns = Vec::new();
        for spec in select {
            match spec {
                ColumnSpec::Star => {
                    for column in &table.columns {
                        claim(&column.name)?;
                        columns.push((column, Ident::output(&column.name, true)?));
                    }
                }
                ColumnSpec::Column { name, alias } => {
                    let column = table
                        .find_column(name)
                        .ok_or_else(|| RestError::unknown_column(&table.name, name))?;
                    let output = match alias {
                        Some(a) => {
                            let ident = Ident::output(a, false)?;
                            claim(a)?;
                            ident
                        }
                        None => {
                            claim(name)?;
                            Ident::output(name, true)?
                        }
                    };
                    columns.push((column, output));
                }
            }
        }

        let mut resolved = Vec::new();
        for spec in embeds {
            let relationship = self.resolver.resolve(table, spec, depth + 1)?;
            let output = Ident::output(spec.output_name(), spec.alias.is_none())?;
            claim(spec.output_name())?;
            let projection = self.resolve_projection(
                relationship.child,
                &spec.select,
                &spec.embeds,
                next_alias,
                depth + 1,
            )?;
            resolved.push(ResolvedEmbed {
                output,
                relationship,
                projection,
            });
        }

        Ok(Projection {
            table,
            alias,
            columns,
            embeds: resolved,
            outputs,
        })
    }

    /// ` WHERE f1 AND f2 ...`, nothing for an empty filter list
    pub(crate) fn emit_where(
        &self,
        w: &mut SqlWriter,
        table: &TableInfo,
        alias: Alias,
        filters: &[FilterExpression],
    ) -> RestResult<()> {
        if filters.is_empty() {
            return Ok(());
        }
        w.push(" WHERE ");
        w.push_separated(filters, " AND ", |w, f| emit_filter(w, table, alias, f))?;
        Ok(())
    }
}

/// Lower one filter to SQL
fn emit_filter(
    w: &mut SqlWriter,
    table: &TableInfo,
    alias: Alias,
    f: &FilterExpression,
) -> RestResult<()> {
    let column = table
        .find_column(&f.column)
        .ok_or_else(|| RestError::unknown_column(&table.name, &f.column))?;
    if !f.json_path.is_empty() {
        return emit_json_path_filter(w, alias, column, f);
    }

    let ident = Ident::column(column);
    let ty = &column.column_type;

    match (f.operator, &f.value) {
        (FilterOperator::Is, FilterValue::Is(target)) => {
            if matches!(target, IsTarget::True | IsTarget::False) && *ty != ColumnType::Boolean {
                return Err(RestError::validation(format!(
                    "'{}' is not boolean",
                    column.name
                )));
            }
            w.push_column(alias, &ident).push(" IS ").push(target.sql());
        }

        (
            op @ (FilterOperator::Eq
            | FilterOperator::Neq
            | FilterOperator::Gt
            | FilterOperator::Gte
            | FilterOperator::Lt
            | FilterOperator::Lte),
            FilterValue::Scalar(scalar),
        ) => {
            let value = coerce_scalar(column, scalar)?;
            push_comparable(w, alias, &ident, column, op)?;
            w.push(op.sql()).push_param(value);
        }

        (op @ (FilterOperator::Like | FilterOperator::Ilike), FilterValue::Scalar(scalar)) => {
            match ty {
                ColumnType::Text => {
                    w.push_column(alias, &ident);
                }
                ColumnType::Other(_) => {
                    w.push_column(alias, &ident).push("::text");
                }
                _ => return Err(op_type_error(op, column)),
            }
            let pattern = scalar.as_text().ok_or_else(|| null_operand(op))?;
            w.push(op.sql()).push_param(SqlValue::Text(pattern));
        }

        (FilterOperator::In, FilterValue::List(items)) => {
            let values = items
                .iter()
                .map(|s| coerce_scalar(column, s))
                .collect::<RestResult<Vec<_>>>()?;
            push_comparable(w, alias, &ident, column, FilterOperator::In)?;
            w.push(" IN (");
            w.push_separated(values, ", ", |w, v| {
                w.push_param(v);
                Ok(())
            })?;
            w.push(")");
        }

        (FilterOperator::Cs, FilterValue::Scalar(scalar)) => {
            let raw = scalar.as_text().ok_or_else(|| null_operand(FilterOperator::Cs))?;
            match ty {
                ColumnType::Array(element) => {
                    let inner = raw
                        .strip_prefix('{')
                        .and_then(|r| r.strip_suffix('}'))
                        .unwrap_or(&raw);
                    let values = split_list(inner)?
                        .iter()
                        .map(|item| coerce_element(column, element, item))
                        .collect::<RestResult<Vec<_>>>()?;
                    w.push_column(alias, &ident)
                        .push(" @> ")
                        .push_param(SqlValue::Array(values));
                }
                ColumnType::Json | ColumnType::Jsonb => {
                    let doc: serde_json::Value = serde_json::from_str(&raw).map_err(|_| {
                        RestError::validation(format!(
                            "'cs' on '{}' expects a JSON document",
                            column.name
                        ))
                    })?;
                    w.push_column(alias, &ident);
                    if *ty == ColumnType::Json {
                        w.push("::jsonb");
                    }
                    w.push(" @> ").push_param(SqlValue::Json(doc)).push("::jsonb");
                }
                _ => return Err(op_type_error(FilterOperator::Cs, column)),
            }
        }

        (FilterOperator::Ov, FilterValue::List(items)) => {
            let element = ty
                .element()
                .ok_or_else(|| op_type_error(FilterOperator::Ov, column))?;
            let values = items
                .iter()
                .map(|s| {
                    let raw = s.as_text().ok_or_else(|| null_operand(FilterOperator::Ov))?;
                    coerce_element(column, element, &raw)
                })
                .collect::<RestResult<Vec<_>>>()?;
            w.push_column(alias, &ident)
                .push(" && ")
                .push_param(SqlValue::Array(values));
        }

        (FilterOperator::Fts, FilterValue::Scalar(scalar)) => {
            let query = scalar.as_text().ok_or_else(|| null_operand(FilterOperator::Fts))?;
            match ty {
                ColumnType::Text => {
                    w.push("to_tsvector(").push_column(alias, &ident).push(")");
                }
                ColumnType::TsVector => {
                    w.push_column(alias, &ident);
                }
                _ => return Err(op_type_error(FilterOperator::Fts, column)),
            }
            w.push(" @@ plainto_tsquery(")
                .push_param(SqlValue::Text(query))
                .push(")");
        }

        (op, _) => {
            return Err(RestError::validation(format!(
                "operator '{}' does not accept this operand",
                op
            )))
        }
    }
    Ok(())
}

/// `"t0"."data"->$1::text->>$2::text <op> $3`; extracted values compare as text
fn emit_json_path_filter(
    w: &mut SqlWriter,
    alias: Alias,
    column: &ColumnInfo,
    f: &FilterExpression,
) -> RestResult<()> {
    if !column.column_type.is_json() {
        return Err(RestError::validation(format!(
            "JSON path on non-JSON column '{}'",
            column.name
        )));
    }
    let Some((last, init)) = f.json_path.split_last() else {
        return Err(RestError::validation("empty JSON path"));
    };

    w.push_column(alias, &Ident::column(column));
    for key in init {
        w.push("->");
        push_path_key(w, key);
    }
    w.push("->>");
    push_path_key(w, last);

    match (f.operator, &f.value) {
        (FilterOperator::Is, FilterValue::Is(target @ (IsTarget::Null | IsTarget::NotNull))) => {
            w.push(" IS ").push(target.sql());
        }
        (
            op @ (FilterOperator::Eq
            | FilterOperator::Neq
            | FilterOperator::Gt
            | FilterOperator::Gte
            | FilterOperator::Lt
            | FilterOperator::Lte
            | FilterOperator::Like
            | FilterOperator::Ilike),
            FilterValue::Scalar(scalar),
        ) => {
            let text = scalar.as_text().ok_or_else(|| null_operand(op))?;
            w.push(op.sql()).push_param(SqlValue::Text(text));
        }
        (FilterOperator::In, FilterValue::List(items)) => {
            let values = items
                .iter()
                .map(|s| {
                    s.as_text()
                        .map(SqlValue::Text)
                        .ok_or_else(|| null_operand(FilterOperator::In))
                })
                .collect::<RestResult<Vec<_>>>()?;
            w.push(" IN (");
            w.push_separated(values, ", ", |w, v| {
                w.push_param(v);
                Ok(())
            })?;
            w.push(")");
        }
        (op, _) => {
            return Err(RestError::validation(format!(
                "operator '{}' is not supported on JSON paths",
                op
            )))
        }
    }
    Ok(())
}

/// Integer keys index arrays, other keys are object fields
fn push_path_key(w: &mut SqlWriter, key: &str) {
    match key.parse::<i64>() {
        Ok(index) => {
            w.push_param(SqlValue::Int(index)).push("::int");
        }
        Err(_) => {
            w.push_param(SqlValue::Text(key.to_string())).push("::text");
        }
    }
}

/// Left-hand side for scalar comparisons
fn push_comparable(
    w: &mut SqlWriter,
    alias: Alias,
    ident: &Ident,
    column: &ColumnInfo,
    op: FilterOperator,
) -> RestResult<()> {
    match &column.column_type {
        ColumnType::Json | ColumnType::Jsonb | ColumnType::TsVector | ColumnType::Array(_) => {
            Err(op_type_error(op, column))
        }
        ColumnType::Other(_) => {
            w.push_column(alias, ident).push("::text");
            Ok(())
        }
        _ => {
            w.push_column(alias, ident);
            Ok(())
        }
    }
}

fn coerce_scalar(column: &ColumnInfo, scalar: &Scalar) -> RestResult<SqlValue> {
    let raw = scalar.as_text().ok_or_else(|| {
        RestError::validation(format!("use 'is' to compare '{}' with null", column.name))
    })?;
    coerce_text(&raw, &column.column_type)
        .map_err(|e| RestError::validation(format!("{}: {}", column.name, e)))
}

fn coerce_element(column: &ColumnInfo, element: &ColumnType, raw: &str) -> RestResult<SqlValue> {
    coerce_text(raw, element)
        .map_err(|e| RestError::validation(format!("{}: {}", column.name, e)))
}

fn op_type_error(op: FilterOperator, column: &ColumnInfo) -> RestError {
    RestError::validation(format!(
        "operator '{}' is not supported on '{}' ({})",
        op, column.name, column.column_type
    ))
}

fn null_operand(op: FilterOperator) -> RestError {
    RestError::validation(format!("operator '{}' needs a non-null operand", op))
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

/// Projection list of one table, embeds included
pub(crate) fn emit_select_list(w: &mut SqlWriter, p: &Projection<'_>) -> RestResult<()> {
    let mut first = true;
    let mut sep = |w: &mut SqlWriter| {
        if !first {
            w.push(", ");
        }
        first = false;
    };

    for (column, output) in &p.columns {
        sep(w);
        w.push_column(p.alias, &Ident::column(column));
        if matches!(
            column.column_type,
            ColumnType::Other(_) | ColumnType::TsVector
        ) {
            w.push("::text");
        }
        w.push(" AS ").push_ident(output);
    }

    for embed in &p.embeds {
        sep(w);
        let child = &embed.projection;
        let pairs = embed.relationship.join_pairs()?;
        let object = Alias::embed(child.alias.index());

        match embed.relationship.cardinality {
            Cardinality::ManyToOne => {
                // Joined in this scope; an unmatched join yields NULL
                let (probe, _) = pairs[0];
                w.push("CASE WHEN ")
                    .push_column(child.alias, &Ident::column(probe))
                    .push(" IS NULL THEN NULL ELSE (SELECT row_to_json(")
                    .push_alias(object)
                    .push(") FROM (SELECT ");
                emit_select_list(w, child)?;
                w.push(") AS ").push_alias(object).push(") END");
            }
            Cardinality::OneToMany => {
                w.push("(SELECT COALESCE(json_agg(")
                    .push_alias(object)
                    .push("), '[]'::json) FROM (SELECT ");
                emit_select_list(w, child)?;
                w.push(" FROM ")
                    .push_ident(&Ident::table(child.table))
                    .push(" AS ")
                    .push_alias(child.alias);
                emit_joins(w, child)?;
                w.push(" WHERE ");
                w.push_separated(pairs, " AND ", |w, (c, parent)| {
                    w.push_column(child.alias, &Ident::column(c))
                        .push(" = ")
                        .push_column(p.alias, &Ident::column(parent));
                    Ok(())
                })?;
                emit_order(w, child.table, child.alias, &[])?;
                w.push(") AS ").push_alias(object).push(")");
            }
        }
        w.push(" AS ").push_ident(&embed.output);
    }
    Ok(())
}

/// LEFT JOINs for many-to-one embeds reachable without crossing a subselect
pub(crate) fn emit_joins(w: &mut SqlWriter, p: &Projection<'_>) -> RestResult<()> {
    for embed in &p.embeds {
        if embed.relationship.cardinality != Cardinality::ManyToOne {
            continue;
        }
        let child = &embed.projection;
        w.push(" LEFT JOIN ")
            .push_ident(&Ident::table(child.table))
            .push(" AS ")
            .push_alias(child.alias)
            .push(" ON ");
        w.push_separated(embed.relationship.join_pairs()?, " AND ", |w, (c, parent)| {
            w.push_column(child.alias, &Ident::column(c))
                .push(" = ")
                .push_column(p.alias, &Ident::column(parent));
            Ok(())
        })?;
        emit_joins(w, child)?;
    }
    Ok(())
}

/// ORDER BY the requested terms, then any primary key columns not yet ordered
pub(crate) fn emit_order(
    w: &mut SqlWriter,
    table: &TableInfo,
    alias: Alias,
    order: &[OrderSpec],
) -> RestResult<()> {
    let mut terms: Vec<(&ColumnInfo, Direction, NullsOrder)> = Vec::new();
    for spec in order {
        let column = table
            .find_column(&spec.column)
            .ok_or_else(|| RestError::unknown_column(&table.name, &spec.column))?;
        if column.column_type == ColumnType::Json {
            return Err(RestError::validation(format!(
                "cannot order by json column '{}'",
                column.name
            )));
        }
        terms.push((column, spec.direction, spec.nulls));
    }
    for pk in &table.primary_key {
        if terms.iter().any(|(c, _, _)| &c.name == pk) {
            continue;
        }
        if let Some(column) = table.find_column(pk) {
            terms.push((column, Direction::Asc, NullsOrder::Default));
        }
    }

    if terms.is_empty() {
        return Ok(());
    }
    w.push(" ORDER BY ");
    w.push_separated(terms, ", ", |w, (column, direction, nulls)| {
        w.push_column(alias, &Ident::column(column));
        w.push(match direction {
            Direction::Asc => " ASC",
            Direction::Desc => " DESC",
        });
        w.push(match nulls {
            NullsOrder::Default => "",
            NullsOrder::First => " NULLS FIRST",
            NullsOrder::Last => " NULLS LAST",
        });
        Ok(())
    })?;
    Ok(())
}
