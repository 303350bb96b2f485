//! Schema introspection from `information_schema` and `pg_catalog`

use std::collections::BTreeMap;

use tokio_postgres::Client;

use crate::schema::{
    ColumnInfo, ColumnType, ForeignKeyInfo, SchemaError, SchemaResult, SchemaSnapshot, TableInfo,
    TableRef,
};

const COLUMNS_SQL: &str = "SELECT c.table_schema::text, c.table_name::text, \
c.column_name::text, c.udt_name::text, \
(c.is_nullable = 'YES') AS nullable, \
(c.column_default IS NOT NULL OR c.is_identity = 'YES') AS has_default \
FROM information_schema.columns c \
JOIN information_schema.tables t \
ON t.table_schema = c.table_schema AND t.table_name = c.table_name \
WHERE c.table_schema::text = ANY($1::text[]) AND t.table_type IN ('BASE TABLE', 'VIEW') \
ORDER BY c.table_schema, c.table_name, c.ordinal_position";

const CONSTRAINTS_SQL: &str = "SELECT con.conname::text, ns.nspname::text, cl.relname::text, \
con.contype::text, \
array(SELECT a.attname::text FROM unnest(con.conkey) WITH ORDINALITY AS k(n, i) \
JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.n ORDER BY k.i) AS columns, \
coalesce(fns.nspname::text, '') AS ref_schema, \
coalesce(fcl.relname::text, '') AS ref_table, \
array(SELECT a.attname::text FROM unnest(coalesce(con.confkey, '{}')) WITH ORDINALITY AS k(n, i) \
JOIN pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.n ORDER BY k.i) AS ref_columns \
FROM pg_constraint con \
JOIN pg_class cl ON cl.oid = con.conrelid \
JOIN pg_namespace ns ON ns.oid = cl.relnamespace \
LEFT JOIN pg_class fcl ON fcl.oid = con.confrelid \
LEFT JOIN pg_namespace fns ON fns.oid = fcl.relnamespace \
WHERE con.contype IN ('p', 'f') AND ns.nspname::text = ANY($1::text[]) \
ORDER BY ns.nspname, cl.relname, con.conname";

fn introspection(err: tokio_postgres::Error) -> SchemaError {
    SchemaError::Introspection(err.to_string())
}

/// Read the exposed schemas into a snapshot stamped with `version`
pub async fn introspect(
    client: &Client,
    schemas: &[String],
    version: u64,
) -> SchemaResult<SchemaSnapshot> {
    let mut tables: BTreeMap<TableRef, TableInfo> = BTreeMap::new();

    for row in client
        .query(COLUMNS_SQL, &[&schemas])
        .await
        .map_err(introspection)?
    {
        let schema: String = row.try_get(0).map_err(introspection)?;
        let table: String = row.try_get(1).map_err(introspection)?;
        let name: String = row.try_get(2).map_err(introspection)?;
        let udt: String = row.try_get(3).map_err(introspection)?;
        let nullable: bool = row.try_get(4).map_err(introspection)?;
        let has_default: bool = row.try_get(5).map_err(introspection)?;

        let mut column = ColumnInfo::new(name, ColumnType::from_pg_name(&udt));
        column.nullable = nullable;
        column.has_default = has_default;

        tables
            .entry(TableRef::new(schema.clone(), table.clone()))
            .or_insert_with(|| TableInfo::new(schema, table))
            .columns
            .push(column);
    }

    for row in client
        .query(CONSTRAINTS_SQL, &[&schemas])
        .await
        .map_err(introspection)?
    {
        let name: String = row.try_get(0).map_err(introspection)?;
        let schema: String = row.try_get(1).map_err(introspection)?;
        let table: String = row.try_get(2).map_err(introspection)?;
        let kind: String = row.try_get(3).map_err(introspection)?;
        let columns: Vec<String> = row.try_get(4).map_err(introspection)?;
        let referenced_schema: String = row.try_get(5).map_err(introspection)?;
        let referenced_table: String = row.try_get(6).map_err(introspection)?;
        let referenced_columns: Vec<String> = row.try_get(7).map_err(introspection)?;

        let Some(info) = tables.get_mut(&TableRef::new(schema.clone(), table)) else {
            continue;
        };
        if kind == "p" {
            info.primary_key = columns;
        } else if schemas.contains(&referenced_schema) {
            let referenced_schema = if referenced_schema == schema {
                String::new()
            } else {
                referenced_schema
            };
            info.foreign_keys.push(ForeignKeyInfo {
                name,
                columns,
                referenced_schema,
                referenced_table,
                referenced_columns,
            });
        }
    }

    let snapshot = SchemaSnapshot::new(version, tables.into_values().collect())?;
    tracing::info!(
        event = "SCHEMA_INTROSPECTED",
        version,
        tables = snapshot.len(),
    );
    Ok(snapshot)
}
