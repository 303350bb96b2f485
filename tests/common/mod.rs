//! Shared test doubles
//!
//! `FakePool` is a bounded pool (tokio `Semaphore`) of fake physical
//! sessions. Session settings live with the physical session, so whatever
//! one request leaves behind is visible to the next borrower of the same
//! connection. Binder statements are interpreted; every other statement is
//! answered by the test's responder. Everything sent is recorded.
//!
//! With `recycle_dropped` a connection dropped while checked out goes back
//! to the idle list untouched, the way a deadpool `Object` does.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use aerogate::auth::binder::{
    BIND_SQL, BIND_WITH_ROLE_SQL, RESET_CLAIMS_SQL, RESET_ROLE_SQL, RESET_TIMEOUT_SQL, VERIFY_SQL,
};
use aerogate::auth::{AuthError, AuthResolver, AuthResult, SecurityContext};
use aerogate::executor::{
    CancelHandle, Connection, ConnectionPool, DriverError, PoolError, Row, SqlValue,
};
use aerogate::schema::{ColumnInfo, ColumnType, SchemaSnapshot, TableInfo};

pub const CLAIMS: &str = "request.jwt.claims";

/// One statement as the database saw it
#[derive(Debug, Clone)]
pub struct Call {
    pub connection_id: u64,
    pub sql: String,
    pub params: Vec<SqlValue>,
    /// Session settings at the time of the call
    pub settings: HashMap<String, String>,
}

impl Call {
    pub fn claims(&self) -> &str {
        self.settings.get(CLAIMS).map(String::as_str).unwrap_or("")
    }
}

pub type Responder = dyn Fn(&Call) -> Result<Vec<Row>, DriverError> + Send + Sync;

#[derive(Default)]
struct Shared {
    sessions: Mutex<HashMap<u64, Arc<Mutex<HashMap<String, String>>>>>,
    idle: Mutex<Vec<u64>>,
    checked_out: Mutex<HashSet<u64>>,
    log: Mutex<Vec<Call>>,
    next_id: AtomicU64,
    released: AtomicU64,
    discarded: AtomicU64,
    borrowed: AtomicU64,
    cancelled: AtomicBool,
    break_reset: AtomicBool,
    recycle_dropped: AtomicBool,
}

/// Bounded fake pool
#[derive(Clone)]
pub struct FakePool {
    permits: Arc<Semaphore>,
    shared: Arc<Shared>,
    responder: Arc<Responder>,
    delay: Option<Duration>,
    reset_delay: Option<Duration>,
}

impl FakePool {
    pub fn new(size: usize) -> Self {
        Self::with_responder(size, |_| Ok(Vec::new()))
    }

    pub fn with_responder<F>(size: usize, responder: F) -> Self
    where
        F: Fn(&Call) -> Result<Vec<Row>, DriverError> + Send + Sync + 'static,
    {
        Self {
            permits: Arc::new(Semaphore::new(size)),
            shared: Arc::new(Shared::default()),
            responder: Arc::new(responder),
            delay: None,
            reset_delay: None,
        }
    }

    /// Stall every application statement by `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Stall the claims reset by `delay`
    pub fn with_reset_delay(mut self, delay: Duration) -> Self {
        self.reset_delay = Some(delay);
        self
    }

    /// Return connections dropped while checked out to the idle list
    pub fn recycle_dropped(&self) {
        self.shared.recycle_dropped.store(true, Ordering::SeqCst);
    }

    /// Make the claims reset a no-op, as a broken server would
    pub fn break_reset(&self) {
        self.shared.break_reset.store(true, Ordering::SeqCst);
    }

    /// Statements sent by the application (binder traffic excluded)
    pub fn app_calls(&self) -> Vec<Call> {
        self.shared
            .log
            .lock()
            .iter()
            .filter(|c| !is_session_sql(&c.sql))
            .cloned()
            .collect()
    }

    /// Every statement sent
    pub fn all_calls(&self) -> Vec<Call> {
        self.shared.log.lock().clone()
    }

    pub fn settings_of(&self, connection_id: u64) -> Option<HashMap<String, String>> {
        self.shared
            .sessions
            .lock()
            .get(&connection_id)
            .map(|s| s.lock().clone())
    }

    pub fn borrowed(&self) -> u64 {
        self.shared.borrowed.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.shared.released.load(Ordering::SeqCst)
    }

    pub fn discarded(&self) -> u64 {
        self.shared.discarded.load(Ordering::SeqCst)
    }

    pub fn cancel_fired(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }
}

fn is_session_sql(sql: &str) -> bool {
    [
        BIND_SQL,
        BIND_WITH_ROLE_SQL,
        RESET_CLAIMS_SQL,
        RESET_TIMEOUT_SQL,
        RESET_ROLE_SQL,
        VERIFY_SQL,
        "BEGIN",
        "COMMIT",
        "ROLLBACK",
    ]
    .contains(&sql)
}

#[async_trait]
impl ConnectionPool for FakePool {
    async fn borrow(&self, timeout: Duration) -> Result<Box<dyn Connection>, PoolError> {
        let permit = tokio::time::timeout(timeout, Arc::clone(&self.permits).acquire_owned())
            .await
            .map_err(|_| PoolError::Timeout(timeout))?
            .map_err(|_| PoolError::Closed)?;

        let id = match self.shared.idle.lock().pop() {
            Some(id) => id,
            None => {
                let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                self.shared
                    .sessions
                    .lock()
                    .insert(id, Arc::new(Mutex::new(HashMap::new())));
                id
            }
        };
        let settings = self
            .shared
            .sessions
            .lock()
            .get(&id)
            .cloned()
            .ok_or(PoolError::Closed)?;
        self.shared.checked_out.lock().insert(id);
        self.shared.borrowed.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(FakeConnection {
            id,
            settings,
            shared: Arc::clone(&self.shared),
            responder: Arc::clone(&self.responder),
            delay: self.delay,
            reset_delay: self.reset_delay,
            _permit: permit,
        }))
    }

    async fn release(&self, conn: Box<dyn Connection>) {
        self.shared.checked_out.lock().remove(&conn.id());
        self.shared.idle.lock().push(conn.id());
        self.shared.released.fetch_add(1, Ordering::SeqCst);
    }

    fn discard(&self, conn: Box<dyn Connection>) {
        self.shared.checked_out.lock().remove(&conn.id());
        self.shared.sessions.lock().remove(&conn.id());
        self.shared.discarded.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeConnection {
    id: u64,
    settings: Arc<Mutex<HashMap<String, String>>>,
    shared: Arc<Shared>,
    responder: Arc<Responder>,
    delay: Option<Duration>,
    reset_delay: Option<Duration>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        let still_out = self.shared.checked_out.lock().remove(&self.id);
        if still_out && self.shared.recycle_dropped.load(Ordering::SeqCst) {
            self.shared.idle.lock().push(self.id);
        }
    }
}

fn text(params: &[SqlValue], idx: usize) -> String {
    match params.get(idx) {
        Some(SqlValue::Text(s)) => s.clone(),
        _ => String::new(),
    }
}

impl FakeConnection {
    async fn run(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DriverError> {
        let call = Call {
            connection_id: self.id,
            sql: sql.to_string(),
            params: params.to_vec(),
            settings: self.settings.lock().clone(),
        };
        self.shared.log.lock().push(call.clone());

        if sql == BIND_SQL || sql == BIND_WITH_ROLE_SQL {
            let mut settings = self.settings.lock();
            settings.insert(CLAIMS.into(), text(params, 0));
            settings.insert("request.jwt.claim.sub".into(), text(params, 1));
            settings.insert("request.jwt.claim.role".into(), text(params, 2));
            settings.insert("statement_timeout".into(), text(params, 3));
            if sql == BIND_WITH_ROLE_SQL {
                settings.insert("role".into(), text(params, 4));
            }
            return Ok(vec![Row::new()]);
        }
        if sql == RESET_CLAIMS_SQL {
            if let Some(delay) = self.reset_delay {
                tokio::time::sleep(delay).await;
            }
            if !self.shared.break_reset.load(Ordering::SeqCst) {
                let mut settings = self.settings.lock();
                for key in [CLAIMS, "request.jwt.claim.sub", "request.jwt.claim.role"] {
                    settings.insert(key.into(), String::new());
                }
            }
            return Ok(vec![Row::new()]);
        }
        if sql == RESET_TIMEOUT_SQL {
            self.settings.lock().remove("statement_timeout");
            return Ok(Vec::new());
        }
        if sql == RESET_ROLE_SQL {
            self.settings.lock().remove("role");
            return Ok(Vec::new());
        }
        if sql == VERIFY_SQL {
            let claims = self.settings.lock().get(CLAIMS).cloned().unwrap_or_default();
            return Ok(vec![Row::new().with("claims", SqlValue::Text(claims))]);
        }
        if matches!(sql, "BEGIN" | "COMMIT" | "ROLLBACK") {
            return Ok(Vec::new());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(&call)
    }
}

#[async_trait]
impl Connection for FakeConnection {
    fn id(&self) -> u64 {
        self.id
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DriverError> {
        self.run(sql, params).await
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DriverError> {
        self.run(sql, params).await.map(|rows| rows.len() as u64)
    }

    fn cancel_handle(&self) -> Arc<dyn CancelHandle> {
        Arc::new(FakeCancel {
            shared: Arc::clone(&self.shared),
        })
    }
}

struct FakeCancel {
    shared: Arc<Shared>,
}

#[async_trait]
impl CancelHandle for FakeCancel {
    async fn cancel(&self) -> Result<(), DriverError> {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Resolves `token-<subject>` to an authenticated context
pub struct StaticAuth;

#[async_trait]
impl AuthResolver for StaticAuth {
    async fn resolve_identity(&self, token: &str) -> AuthResult<Option<SecurityContext>> {
        match token.strip_prefix("token-") {
            Some("") => Ok(None),
            Some(subject) => Ok(Some(identity(subject))),
            None => Err(AuthError::MalformedToken),
        }
    }
}

pub fn identity(subject: &str) -> SecurityContext {
    let mut claims = Map::new();
    claims.insert("sub".into(), Value::String(subject.into()));
    claims.insert("role".into(), Value::String("authenticated".into()));
    SecurityContext::authenticated(subject, "authenticated", claims)
}

/// users, posts and todos
pub fn app_schema(version: u64) -> SchemaSnapshot {
    let users = TableInfo::new("public", "users")
        .column(ColumnInfo::new("id", ColumnType::BigInt).not_null().with_default())
        .column(ColumnInfo::new("name", ColumnType::Text).not_null())
        .primary_key(&["id"]);
    let posts = TableInfo::new("public", "posts")
        .column(ColumnInfo::new("id", ColumnType::BigInt).not_null().with_default())
        .column(ColumnInfo::new("user_id", ColumnType::BigInt).not_null())
        .column(ColumnInfo::new("title", ColumnType::Text))
        .primary_key(&["id"])
        .foreign_key("posts_user_id_fkey", &["user_id"], "users", &["id"]);
    let todos = TableInfo::new("public", "todos")
        .column(ColumnInfo::new("id", ColumnType::Text).not_null().with_default())
        .column(ColumnInfo::new("title", ColumnType::Text).not_null())
        .column(ColumnInfo::new("completed", ColumnType::Boolean).not_null().with_default())
        .column(ColumnInfo::new("priority", ColumnType::Integer))
        .column(ColumnInfo::new("due", ColumnType::Date))
        .column(ColumnInfo::new("created_at", ColumnType::TimestampTz).not_null().with_default())
        .primary_key(&["id"]);
    SchemaSnapshot::new(version, vec![users, posts, todos]).unwrap()
}
