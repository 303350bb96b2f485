//! # REST API Handler
//!
//! Drives one request through the gateway:
//!
//! `RECEIVED → PARSED → SECURITY_BOUND → COMPILED → EXECUTED →
//! {RESPONDED_OK | RESPONDED_ERROR}`
//!
//! Identity resolution does no database I/O. The session bind happens
//! inside EXECUTED, right before the statement, so a request that fails to
//! parse or compile never borrows a connection. Nothing is retried, with
//! one exception: a compile that raced a schema refresh is recompiled once
//! against the newer snapshot.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::auth::{AuthError, AuthResolver, SecurityContext, SecurityContextBinder};
use crate::config::GatewayConfig;
use crate::executor::{rows_to_json, ConnectionPool, ExecutionEngine};
use crate::schema::{SchemaCache, SchemaOracle, SchemaSnapshot};

use super::builder::QueryBuilder;
use super::errors::{RestError, RestResult};
use super::parser::{parse_params, parse_query_string};
use super::prefer::{Preferences, ReturnPreference};
use super::request::{ParsedQuery, QueryRequest};
use super::response::ApiResponse;
use super::sql::QueryPlan;

/// HTTP verb, reduced to what the gateway serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Method::Get)
    }
}

impl FromStr for Method {
    type Err = RestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            other => Err(RestError::validation(format!(
                "unsupported method '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request lifecycle states, logged as `REQUEST_STATE` events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Parsed,
    SecurityBound,
    Compiled,
    Executed,
    RespondedOk,
    RespondedError,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Received => "RECEIVED",
            RequestState::Parsed => "PARSED",
            RequestState::SecurityBound => "SECURITY_BOUND",
            RequestState::Compiled => "COMPILED",
            RequestState::Executed => "EXECUTED",
            RequestState::RespondedOk => "RESPONDED_OK",
            RequestState::RespondedError => "RESPONDED_ERROR",
        }
    }
}

/// What the HTTP layer hands over
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub method: Method,
    /// Target schema; the configured default when `None`
    pub schema: Option<String>,
    pub table: String,
    /// Decoded query parameters in arrival order
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Raw `Prefer` header
    pub prefer: Option<String>,
    pub bearer_token: Option<String>,
}

impl RestRequest {
    pub fn new(method: Method, table: impl Into<String>) -> Self {
        Self {
            method,
            schema: None,
            table: table.into(),
            query: Vec::new(),
            body: None,
            prefer: None,
            bearer_token: None,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Decode and attach an urlencoded query string
    pub fn with_query(mut self, query: &str) -> Self {
        self.query = parse_query_string(query);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_prefer(mut self, prefer: impl Into<String>) -> Self {
        self.prefer = Some(prefer.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

/// Compile a parsed request against `snapshot`
///
/// `oracle` supplies the latest known schema version; a snapshot older
/// than it is rejected with `STALE_SCHEMA`.
pub fn compile_plan(
    config: &GatewayConfig,
    snapshot: &SchemaSnapshot,
    oracle: &dyn SchemaOracle,
    req: &RestRequest,
    parsed: ParsedQuery,
) -> RestResult<QueryPlan> {
    let schema = target_schema(config, req)?;
    let builder = QueryBuilder::for_snapshot(snapshot, oracle, config.max_embed_depth)?;
    let prefs = Preferences::parse(req.prefer.as_deref());

    match req.method {
        Method::Get => {
            let query = QueryRequest::new(schema, &req.table, parsed, &config.limits())?;
            builder.compile_read(&query)
        }
        Method::Post => {
            let query = QueryRequest::for_mutation(schema, &req.table, parsed)?;
            let body = require_body(req)?;
            builder.compile_insert(&query, body, prefs.returning, config.max_batch_rows)
        }
        Method::Patch => {
            let query = QueryRequest::for_mutation(schema, &req.table, parsed)?;
            let body = require_body(req)?;
            builder.compile_update(&query, body, prefs.returning)
        }
        Method::Delete => {
            let query = QueryRequest::for_mutation(schema, &req.table, parsed)?;
            builder.compile_delete(&query, prefs.returning)
        }
    }
}

/// Parse and compile against a standalone snapshot
pub fn plan_request(
    config: &GatewayConfig,
    snapshot: &SchemaSnapshot,
    req: &RestRequest,
) -> RestResult<QueryPlan> {
    let parsed = parse_params(&req.query)?;
    compile_plan(config, snapshot, snapshot, req, parsed)
}

fn target_schema<'r>(config: &'r GatewayConfig, req: &'r RestRequest) -> RestResult<&'r str> {
    let schema = req.schema.as_deref().unwrap_or(&config.schema);
    if config.exposed_schemas.iter().any(|s| s == schema) {
        Ok(schema)
    } else {
        Err(RestError::validation(format!(
            "schema '{}' is not exposed",
            schema
        )))
    }
}

fn require_body(req: &RestRequest) -> RestResult<&Value> {
    req.body
        .as_ref()
        .ok_or_else(|| RestError::validation("request body is required"))
}

/// The gateway entry point
pub struct RestApi {
    config: GatewayConfig,
    schema: SchemaCache,
    auth: Arc<dyn AuthResolver>,
    engine: ExecutionEngine,
}

impl RestApi {
    pub fn new(
        config: GatewayConfig,
        schema: SchemaCache,
        auth: Arc<dyn AuthResolver>,
        pool: Arc<dyn ConnectionPool>,
    ) -> Self {
        let binder = SecurityContextBinder::new(config.statement_timeout())
            .with_switch_role(config.switch_role)
            .with_verify_reset(config.verify_session_reset);
        let engine = ExecutionEngine::new(pool, binder, config.pool_wait_timeout());
        Self {
            config,
            schema,
            auth,
            engine,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn schema_cache(&self) -> &SchemaCache {
        &self.schema
    }

    /// Serve one request
    pub async fn handle(
        &self,
        req: RestRequest,
        cancel: &CancellationToken,
    ) -> ApiResponse<Value> {
        let request_id = Uuid::new_v4();
        transition(request_id, RequestState::Received);
        tracing::debug!(
            event = "REQUEST_RECEIVED",
            request_id = %request_id,
            method = req.method.as_str(),
            table = %req.table,
        );

        match self.process(&req, cancel, request_id).await {
            Ok(data) => {
                transition(request_id, RequestState::RespondedOk);
                let status = if req.method == Method::Post {
                    StatusCode::CREATED
                } else {
                    StatusCode::OK
                };
                ApiResponse::with_status(status, data)
            }
            Err(err) => {
                transition(request_id, RequestState::RespondedError);
                tracing::info!(
                    event = "REQUEST_FAILED",
                    request_id = %request_id,
                    code = err.code(),
                );
                ApiResponse::from_error(&err)
            }
        }
    }

    async fn process(
        &self,
        req: &RestRequest,
        cancel: &CancellationToken,
        request_id: Uuid,
    ) -> RestResult<Value> {
        let parsed = parse_params(&req.query)?;
        transition(request_id, RequestState::Parsed);

        let ctx = self.resolve_identity(req.bearer_token.as_deref()).await?;
        transition(request_id, RequestState::SecurityBound);

        let plan = self.compile(req, parsed)?;
        transition(request_id, RequestState::Compiled);

        let rows = self.engine.run(&plan, &ctx, cancel).await?;
        transition(request_id, RequestState::Executed);

        let minimal = req.method.is_mutation()
            && Preferences::parse(req.prefer.as_deref()).returning == ReturnPreference::Minimal;
        if minimal {
            Ok(Value::Array(Vec::new()))
        } else {
            Ok(rows_to_json(&rows))
        }
    }

    fn compile(&self, req: &RestRequest, parsed: ParsedQuery) -> RestResult<QueryPlan> {
        let snapshot = self.schema.current();
        match compile_plan(&self.config, &snapshot, &self.schema, req, parsed.clone()) {
            Err(RestError::StaleSchema { snapshot, current }) => {
                tracing::debug!(event = "SCHEMA_RACE", snapshot, current);
                let fresh = self.schema.current();
                compile_plan(&self.config, &fresh, &self.schema, req, parsed)
            }
            other => other,
        }
    }

    async fn resolve_identity(&self, token: Option<&str>) -> RestResult<SecurityContext> {
        match token {
            None if self.config.require_identity => Err(AuthError::MissingToken.into()),
            None => Ok(SecurityContext::anonymous(&self.config.anon_role)),
            Some(token) => match self.auth.resolve_identity(token).await {
                Ok(Some(ctx)) => Ok(ctx),
                Ok(None) => Err(AuthError::UnknownIdentity.into()),
                Err(err) => Err(err.into()),
            },
        }
    }
}

fn transition(request_id: Uuid, state: RequestState) {
    tracing::debug!(
        event = "REQUEST_STATE",
        request_id = %request_id,
        state = state.as_str(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnInfo, ColumnType, TableInfo};
    use serde_json::json;

    fn snapshot() -> SchemaSnapshot {
        let todos = TableInfo::new("public", "todos")
            .column(ColumnInfo::new("id", ColumnType::BigInt).not_null())
            .column(ColumnInfo::new("title", ColumnType::Text))
            .primary_key(&["id"]);
        SchemaSnapshot::new(1, vec![todos]).unwrap()
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("patch".parse::<Method>().unwrap(), Method::Patch);
        assert_eq!(
            "PUT".parse::<Method>().unwrap_err().code(),
            "VALIDATION_ERROR"
        );
    }

    #[test]
    fn test_plan_read() {
        let req = RestRequest::new(Method::Get, "todos").with_query("id.eq=4");
        let plan = plan_request(&GatewayConfig::default(), &snapshot(), &req).unwrap();
        assert!(plan.sql.as_str().starts_with("SELECT "));
        assert!(!plan.sql.as_str().contains('4'));
    }

    #[test]
    fn test_unexposed_schema() {
        let req = RestRequest::new(Method::Get, "todos").with_schema("internal");
        let err = plan_request(&GatewayConfig::default(), &snapshot(), &req).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_patch_requires_body() {
        let req = RestRequest::new(Method::Patch, "todos").with_query("id.eq=1");
        let err = plan_request(&GatewayConfig::default(), &snapshot(), &req).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_delete_without_filters() {
        let req = RestRequest::new(Method::Delete, "todos");
        let err = plan_request(&GatewayConfig::default(), &snapshot(), &req).unwrap_err();
        assert_eq!(err, RestError::UnsafeMutation("DELETE"));
    }

    #[test]
    fn test_insert_plan() {
        let req = RestRequest::new(Method::Post, "todos")
            .with_body(json!({"title": "write tests"}))
            .with_prefer("return=representation");
        let plan = plan_request(&GatewayConfig::default(), &snapshot(), &req).unwrap();
        assert!(plan.sql.as_str().contains("RETURNING"));
    }
}
