//! deadpool-postgres backed connection pool

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::types::ToSql;
use tokio_postgres::{CancelToken, NoTls};

use crate::config::DatabaseSettings;
use crate::executor::{
    CancelHandle, Connection, ConnectionPool, DriverError, PoolError, Row, SqlValue,
};

use super::codec::{decode_row, driver_error};

static NEXT_CHECKOUT: AtomicU64 = AtomicU64::new(1);

/// Postgres pool adapter
#[derive(Clone)]
pub struct PgPool {
    pool: Pool,
}

impl PgPool {
    /// Build a pool from settings; connections open lazily
    pub fn from_settings(settings: &DatabaseSettings) -> Result<Self, PoolError> {
        let mut cfg = Config::new();
        cfg.url = Some(settings.url.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(settings.pool_size));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| PoolError::Connect(format!("failed to create pool: {}", e)))?;
        Ok(Self { pool })
    }

    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Borrow a raw client, for introspection
    pub async fn client(&self) -> Result<Object, PoolError> {
        self.pool.get().await.map_err(map_pool_error)
    }
}

fn map_pool_error(err: deadpool_postgres::PoolError) -> PoolError {
    match err {
        deadpool_postgres::PoolError::Timeout(_) => PoolError::Timeout(Duration::ZERO),
        deadpool_postgres::PoolError::Closed => PoolError::Closed,
        other => PoolError::Connect(other.to_string()),
    }
}

#[async_trait]
impl ConnectionPool for PgPool {
    async fn borrow(&self, timeout: Duration) -> Result<Box<dyn Connection>, PoolError> {
        let object = match tokio::time::timeout(timeout, self.pool.get()).await {
            Err(_) => return Err(PoolError::Timeout(timeout)),
            Ok(res) => res.map_err(map_pool_error)?,
        };
        Ok(Box::new(PgConnection {
            id: NEXT_CHECKOUT.fetch_add(1, Ordering::Relaxed),
            object,
        }))
    }

    async fn release(&self, conn: Box<dyn Connection>) {
        // Dropping the deadpool object returns it to the pool.
        drop(conn);
    }

    fn discard(&self, conn: Box<dyn Connection>) {
        conn.detach();
    }
}

/// One checked-out Postgres session
///
/// `id` is a checkout sequence number; the backend pid would cost a round
/// trip per borrow.
pub struct PgConnection {
    id: u64,
    object: Object,
}

impl PgConnection {
    fn params<'p>(params: &'p [SqlValue]) -> Vec<&'p (dyn ToSql + Sync)> {
        params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
    }
}

#[async_trait]
impl Connection for PgConnection {
    fn id(&self) -> u64 {
        self.id
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DriverError> {
        let statement = self
            .object
            .prepare_cached(sql)
            .await
            .map_err(driver_error)?;
        let rows = self
            .object
            .query(&statement, &Self::params(params))
            .await
            .map_err(driver_error)?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DriverError> {
        let statement = self
            .object
            .prepare_cached(sql)
            .await
            .map_err(driver_error)?;
        self.object
            .execute(&statement, &Self::params(params))
            .await
            .map_err(driver_error)
    }

    fn cancel_handle(&self) -> Arc<dyn CancelHandle> {
        Arc::new(PgCancel {
            token: self.object.cancel_token(),
        })
    }

    fn detach(self: Box<Self>) {
        let this = *self;
        drop(Object::take(this.object));
    }
}

struct PgCancel {
    token: CancelToken,
}

#[async_trait]
impl CancelHandle for PgCancel {
    async fn cancel(&self) -> Result<(), DriverError> {
        self.token.cancel_query(NoTls).await.map_err(driver_error)
    }
}
