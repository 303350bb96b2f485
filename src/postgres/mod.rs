//! Postgres adapter
//!
//! Implements the executor's collaborator traits on top of
//! deadpool-postgres and tokio-postgres, and reads schema snapshots from
//! the catalog. Compiled only with the `postgres` feature.

mod codec;
mod introspect;
mod pool;

pub use codec::{decode_numeric, decode_row, driver_error, PgNumeric};
pub use introspect::introspect;
pub use pool::{PgConnection, PgPool};

use crate::executor::PoolError;
use crate::schema::{SchemaError, SchemaResult, SchemaSnapshot};

impl PgPool {
    /// Introspect `schemas` over a pooled client
    pub async fn introspect(
        &self,
        schemas: &[String],
        version: u64,
    ) -> SchemaResult<SchemaSnapshot> {
        let client = self
            .client()
            .await
            .map_err(|e: PoolError| SchemaError::Introspection(e.to_string()))?;
        introspect(&client, schemas, version).await
    }
}
