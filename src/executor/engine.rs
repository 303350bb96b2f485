//! Execution engine
//!
//! Runs one compiled [`QueryPlan`] for one caller.
//!
//! Execution flow (strict order):
//! 1. Borrow a connection, waiting at most the pool wait timeout
//! 2. Bind the caller's security context to the session
//! 3. Run the statement (mutations inside BEGIN/COMMIT)
//! 4. Reset the session and release the connection
//!
//! Cancellation at any point after the borrow fires the driver cancel
//! handle and discards the connection. A committed mutation stays
//! committed. Nothing is retried here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::auth::{BoundSession, SecurityContext, SecurityContextBinder};
use crate::rest_api::{QueryPlan, RestError, RestResult, StatementKind};

use super::connection::{Connection, ConnectionPool};
use super::errors::DriverError;
use super::sqlstate::{classify, classify_pool};
use super::value::Row;

/// Where a driver failure happened
enum Failure {
    Bind(DriverError),
    Statement(DriverError),
}

/// Runs plans over pooled, identity-bound sessions
pub struct ExecutionEngine {
    pool: Arc<dyn ConnectionPool>,
    binder: SecurityContextBinder,
    wait_timeout: Duration,
}

impl ExecutionEngine {
    pub fn new(
        pool: Arc<dyn ConnectionPool>,
        binder: SecurityContextBinder,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            binder,
            wait_timeout,
        }
    }

    pub fn binder(&self) -> &SecurityContextBinder {
        &self.binder
    }

    /// Execute `plan` as `ctx`
    ///
    /// Minimal mutations return no rows.
    pub async fn run(
        &self,
        plan: &QueryPlan,
        ctx: &SecurityContext,
        cancel: &CancellationToken,
    ) -> RestResult<Vec<Row>> {
        if cancel.is_cancelled() {
            return Err(RestError::Cancelled);
        }

        let conn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RestError::Cancelled),
            borrowed = self.pool.borrow(self.wait_timeout) => {
                borrowed.map_err(|e| classify_pool(&e))?
            }
        };

        let mut session = BoundSession::new(Arc::clone(&self.pool), conn);
        let (connection_id, cancel_handle) = match session.connection() {
            Some(conn) => (conn.id(), conn.cancel_handle()),
            None => return Err(RestError::internal("borrowed session has no connection")),
        };

        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            res = Self::bind_and_execute(&self.binder, &mut session, plan, ctx) => Some(res),
        };

        match outcome {
            None => {
                if let Err(err) = cancel_handle.cancel().await {
                    tracing::warn!(event = "CANCEL_FAILED", connection_id, error = %err);
                }
                session.discard("request cancelled");
                tracing::info!(event = "STATEMENT_CANCELLED", connection_id);
                Err(RestError::Cancelled)
            }
            Some(Err(Failure::Bind(err))) => {
                session.discard("bind failed");
                Err(classify(&err))
            }
            Some(Err(Failure::Statement(err))) => {
                self.binder.release(session).await;
                tracing::debug!(
                    event = "STATEMENT_FAILED",
                    connection_id,
                    sqlstate = err.sqlstate().unwrap_or(""),
                );
                Err(classify(&err))
            }
            Some(Ok(rows)) => {
                self.binder.release(session).await;
                tracing::debug!(
                    event = "STATEMENT_EXECUTED",
                    connection_id,
                    sql = plan.sql.as_str(),
                    params = plan.params.len(),
                    rows = rows.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                );
                Ok(rows)
            }
        }
    }

    async fn bind_and_execute(
        binder: &SecurityContextBinder,
        session: &mut BoundSession,
        plan: &QueryPlan,
        ctx: &SecurityContext,
    ) -> Result<Vec<Row>, Failure> {
        binder.bind(session, ctx).await.map_err(Failure::Bind)?;
        let conn = session
            .connection()
            .ok_or_else(|| Failure::Bind(DriverError::Closed("session released".into())))?;

        match plan.kind {
            StatementKind::Read => conn
                .query(plan.sql.as_str(), plan.params.as_slice())
                .await
                .map_err(Failure::Statement),
            StatementKind::Mutation { returning } => {
                in_transaction(conn.as_mut(), plan, returning)
                    .await
                    .map_err(Failure::Statement)
            }
        }
    }
}

/// All-or-nothing: any failure rolls the whole statement back
async fn in_transaction(
    conn: &mut dyn Connection,
    plan: &QueryPlan,
    returning: bool,
) -> Result<Vec<Row>, DriverError> {
    conn.execute("BEGIN", &[]).await?;

    let result = if returning {
        conn.query(plan.sql.as_str(), plan.params.as_slice()).await
    } else {
        conn.execute(plan.sql.as_str(), plan.params.as_slice())
            .await
            .map(|affected| {
                tracing::debug!(event = "ROWS_AFFECTED", affected);
                Vec::new()
            })
    };

    match result {
        Ok(rows) => {
            conn.execute("COMMIT", &[]).await?;
            Ok(rows)
        }
        Err(err) => {
            if let Err(rollback) = conn.execute("ROLLBACK", &[]).await {
                tracing::warn!(event = "ROLLBACK_FAILED", connection_id = conn.id(), error = %rollback);
            }
            Err(err)
        }
    }
}
