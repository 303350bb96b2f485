//! # Security Context Binder
//!
//! Binds a caller's identity to a borrowed connection and clears it before
//! the connection goes back to the pool.
//!
//! ## Session lifecycle
//! 1. `bind` sets `request.jwt.claims`, `request.jwt.claim.sub`,
//!    `request.jwt.claim.role`, `statement_timeout` and (optionally) `role`
//!    as session-level settings.
//! 2. The caller runs exactly one request's statements.
//! 3. `release` resets every setting, reads the claims back, and only then
//!    returns the connection. Any failure along the way discards it.
//!
//! The connection is wrapped in a [`BoundSession`] before `bind` runs. A
//! session dropped without `release` discards its connection, so a cancelled
//! request can never hand a bound session to the next borrower.

use std::sync::Arc;
use std::time::Duration;

use crate::executor::{Connection, ConnectionPool, DriverError, SqlValue};

use super::context::SecurityContext;

pub const BIND_SQL: &str = "SELECT set_config('request.jwt.claims', $1, false), \
set_config('request.jwt.claim.sub', $2, false), \
set_config('request.jwt.claim.role', $3, false), \
set_config('statement_timeout', $4, false)";

pub const BIND_WITH_ROLE_SQL: &str = "SELECT set_config('request.jwt.claims', $1, false), \
set_config('request.jwt.claim.sub', $2, false), \
set_config('request.jwt.claim.role', $3, false), \
set_config('statement_timeout', $4, false), \
set_config('role', $5, false)";

pub const RESET_CLAIMS_SQL: &str = "SELECT set_config('request.jwt.claims', '', false), \
set_config('request.jwt.claim.sub', '', false), \
set_config('request.jwt.claim.role', '', false)";

pub const RESET_TIMEOUT_SQL: &str = "RESET statement_timeout";

pub const RESET_ROLE_SQL: &str = "RESET ROLE";

pub const VERIFY_SQL: &str =
    "SELECT coalesce(current_setting('request.jwt.claims', true), '') AS claims";

/// A connection carrying one caller's identity
pub struct BoundSession {
    conn: Option<Box<dyn Connection>>,
    pool: Arc<dyn ConnectionPool>,
}

impl BoundSession {
    /// Take ownership of a freshly borrowed connection
    pub fn new(pool: Arc<dyn ConnectionPool>, conn: Box<dyn Connection>) -> Self {
        Self {
            conn: Some(conn),
            pool,
        }
    }

    /// `None` once the connection has been released or discarded
    pub fn connection(&mut self) -> Option<&mut Box<dyn Connection>> {
        self.conn.as_mut()
    }

    pub fn connection_id(&self) -> Option<u64> {
        self.conn.as_ref().map(|c| c.id())
    }

    /// Throw the connection away without resetting it
    pub fn discard(mut self, reason: &'static str) {
        if let Some(conn) = self.conn.take() {
            discard(&*self.pool, conn, reason);
        }
    }
}

impl Drop for BoundSession {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            discard(&*self.pool, conn, "dropped while bound");
        }
    }
}

fn discard(pool: &dyn ConnectionPool, conn: Box<dyn Connection>, reason: &'static str) {
    tracing::warn!(
        event = "SESSION_DISCARDED",
        connection_id = conn.id(),
        reason,
    );
    pool.discard(conn);
}

/// Binds and resets per-request session state
#[derive(Debug, Clone)]
pub struct SecurityContextBinder {
    statement_timeout: Duration,
    switch_role: bool,
    verify_reset: bool,
}

impl SecurityContextBinder {
    pub fn new(statement_timeout: Duration) -> Self {
        Self {
            statement_timeout,
            switch_role: true,
            verify_reset: true,
        }
    }

    pub fn with_switch_role(mut self, switch_role: bool) -> Self {
        self.switch_role = switch_role;
        self
    }

    pub fn with_verify_reset(mut self, verify_reset: bool) -> Self {
        self.verify_reset = verify_reset;
        self
    }

    pub fn statement_timeout(&self) -> Duration {
        self.statement_timeout
    }

    /// Bind `ctx` to the session's connection
    ///
    /// On failure the caller must discard the session, never release it.
    pub async fn bind(
        &self,
        session: &mut BoundSession,
        ctx: &SecurityContext,
    ) -> Result<(), DriverError> {
        let mut params = vec![
            SqlValue::Text(ctx.claims_json()),
            SqlValue::Text(ctx.subject_id().unwrap_or_default().to_string()),
            SqlValue::Text(ctx.role().to_string()),
            SqlValue::Text(self.statement_timeout.as_millis().to_string()),
        ];
        let sql = if self.switch_role {
            params.push(SqlValue::Text(ctx.role().to_string()));
            BIND_WITH_ROLE_SQL
        } else {
            BIND_SQL
        };

        let conn = session
            .connection()
            .ok_or_else(|| DriverError::Closed("session has no connection".into()))?;
        conn.query(sql, &params).await?;

        tracing::debug!(
            event = "SESSION_BOUND",
            connection_id = conn.id(),
            role = ctx.role(),
            anonymous = ctx.is_anonymous(),
        );
        Ok(())
    }

    /// Reset the session and hand the connection back to the pool
    ///
    /// Returns `true` when the connection was reused, `false` when it was
    /// discarded.
    pub async fn release(&self, mut session: BoundSession) -> bool {
        // The connection stays inside `session` until it is clean; a drop
        // mid-reset discards it through `BoundSession::drop`.
        let Some(conn) = session.connection() else {
            return false;
        };
        let connection_id = conn.id();

        if let Err(err) = self.reset(conn.as_mut()).await {
            tracing::warn!(event = "SESSION_RESET_FAILED", connection_id, error = %err);
            session.discard("reset failed");
            return false;
        }

        if self.verify_reset {
            let verified = conn.query(VERIFY_SQL, &[]).await;
            match verified {
                Ok(rows) if !has_residual_claims(&rows) => {}
                Ok(_) => {
                    session.discard("claims survived reset");
                    return false;
                }
                Err(err) => {
                    tracing::warn!(event = "SESSION_VERIFY_FAILED", connection_id, error = %err);
                    session.discard("verify failed");
                    return false;
                }
            }
        }

        let Some(conn) = session.conn.take() else {
            return false;
        };
        let pool = Arc::clone(&session.pool);
        tracing::debug!(event = "SESSION_RESET", connection_id);
        pool.release(conn).await;
        true
    }

    async fn reset(&self, conn: &mut dyn Connection) -> Result<(), DriverError> {
        conn.query(RESET_CLAIMS_SQL, &[]).await?;
        conn.execute(RESET_TIMEOUT_SQL, &[]).await?;
        if self.switch_role {
            conn.execute(RESET_ROLE_SQL, &[]).await?;
        }
        Ok(())
    }
}

/// Whether the read-back still shows claims (or showed nothing at all)
fn has_residual_claims(rows: &[crate::executor::Row]) -> bool {
    match rows.first().and_then(|row| row.get("claims")) {
        Some(SqlValue::Text(s)) => !s.is_empty(),
        Some(SqlValue::Null) => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Row;

    #[test]
    fn test_residual_claims() {
        let clean = vec![Row::new().with("claims", SqlValue::from(""))];
        assert!(!has_residual_claims(&clean));

        let dirty = vec![Row::new().with("claims", SqlValue::from("{\"sub\":\"a\"}"))];
        assert!(has_residual_claims(&dirty));

        assert!(has_residual_claims(&[]));
    }

    #[test]
    fn test_bind_sql_is_parameterized() {
        assert!(BIND_WITH_ROLE_SQL.contains("$5"));
        assert!(!BIND_SQL.contains("$5"));
    }
}
