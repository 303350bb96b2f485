//! Execution subsystem for aerogate
//!
//! Runs compiled plans over pooled connections and turns what comes back
//! into JSON rows or domain errors.
//!
//! # Execution Flow (strict order)
//!
//! 1. Borrow a connection (bounded wait; the pool is the only backpressure)
//! 2. Bind the caller's identity and statement timeout
//! 3. Execute the parameterized statement
//! 4. Reset session state, verify it, release or discard the connection
//! 5. Convert rows per the documented type table
//!
//! # Invariants
//!
//! - A connection is never returned to the pool carrying claims
//! - Driver text never reaches a caller; unknown SQLSTATEs become
//!   `INTERNAL_ERROR` with a logged correlation id

mod connection;
pub mod convert;
mod engine;
mod errors;
pub mod sqlstate;
mod value;

pub use connection::{CancelHandle, Connection, ConnectionPool};
pub use convert::{row_to_json, rows_to_json, value_to_json};
pub use engine::ExecutionEngine;
pub use errors::{DriverError, PoolError};
pub use sqlstate::{classify, classify_pool};
pub use value::{Row, SqlValue};
