//! Connection and pool collaborator interfaces
//!
//! The gateway never opens or closes physical connections. It borrows one
//! from a [`ConnectionPool`], uses it for exactly one request, and hands it
//! back with `release` or, when its session state is in doubt, `discard`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::errors::{DriverError, PoolError};
use super::value::{Row, SqlValue};

/// Fires a server-side cancel for whatever the connection is running
#[async_trait]
pub trait CancelHandle: Send + Sync {
    async fn cancel(&self) -> Result<(), DriverError>;
}

/// One physical database session
#[async_trait]
pub trait Connection: Send {
    /// Identity used in logs and to recognise reuse of a physical session
    fn id(&self) -> u64;

    /// Run a statement that yields rows
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DriverError>;

    /// Run a statement for its effect; returns the affected row count
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DriverError>;

    fn cancel_handle(&self) -> Arc<dyn CancelHandle>;

    /// Close the physical connection instead of returning it to its pool
    fn detach(self: Box<Self>) {}
}

/// Bounded pool of connections
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Wait up to `timeout` for a free connection
    async fn borrow(&self, timeout: Duration) -> Result<Box<dyn Connection>, PoolError>;

    /// Return a clean connection for reuse
    async fn release(&self, conn: Box<dyn Connection>);

    /// Drop a connection whose session state cannot be trusted
    fn discard(&self, conn: Box<dyn Connection>);
}
