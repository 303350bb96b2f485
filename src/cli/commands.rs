//! CLI command implementations
//!
//! Both commands are offline: they read a schema snapshot file and never
//! open a database connection.

use std::path::Path;

use serde_json::{json, Value};

use crate::config::GatewayConfig;
use crate::rest_api::{plan_request, Method, RestRequest};
use crate::schema::{SchemaLoader, SchemaSnapshot};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Dispatch a parsed command
pub fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::Plan {
            config,
            schema,
            table,
            method,
            query,
            body,
            prefer,
            db_schema,
        } => {
            let config = match config {
                Some(path) => GatewayConfig::load(&path)?,
                None => GatewayConfig::default(),
            };
            let snapshot = SchemaLoader::load_file(&schema)?;

            let mut request = RestRequest::new(method.parse::<Method>()?, table).with_query(&query);
            request.schema = db_schema;
            request.prefer = prefer;
            if let Some(raw) = body {
                let body: Value = serde_json::from_str(&raw)
                    .map_err(|e| CliError::request_error(format!("invalid body: {}", e)))?;
                request = request.with_body(body);
            }

            plan(&config, &snapshot, &request)
        }
        Command::Schema { schema } => describe(&schema),
    }
}

/// Compile and print one request
pub fn plan(config: &GatewayConfig, snapshot: &SchemaSnapshot, request: &RestRequest) -> CliResult<()> {
    match plan_request(config, snapshot, request) {
        Ok(plan) => write_response(serde_json::to_value(&plan)?),
        Err(err) => {
            write_error(err.code(), &err.to_string())?;
            Err(err.into())
        }
    }
}

/// Print tables with their columns and foreign keys
pub fn describe(path: &Path) -> CliResult<()> {
    let snapshot = SchemaLoader::load_file(path)?;
    let tables: Vec<Value> = snapshot
        .tables()
        .map(|t| {
            json!({
                "schema": t.schema,
                "name": t.name,
                "primary_key": t.primary_key,
                "columns": t.columns.iter().map(|c| json!({
                    "name": c.name,
                    "type": c.column_type.pg_name(),
                    "nullable": c.nullable,
                })).collect::<Vec<_>>(),
                "foreign_keys": t.foreign_keys.iter().map(|fk| json!({
                    "name": fk.name,
                    "columns": fk.columns,
                    "references": t.referenced_ref(fk).to_string(),
                    "referenced_columns": fk.referenced_columns,
                })).collect::<Vec<_>>(),
            })
        })
        .collect();

    write_response(json!({
        "version": snapshot.version(),
        "tables": tables,
    }))
}
