//! Schema metadata for the gateway
//!
//! The gateway does not own the schema. It holds a read-only, versioned
//! snapshot supplied by an external oracle and validates every identifier
//! and value against it before any SQL is built.
//!
//! # Design Principles
//!
//! - Snapshots are immutable; refresh swaps the whole snapshot
//! - Versions only move forward
//! - Unknown types are carried, never guessed

mod cache;
pub mod coerce;
mod errors;
mod loader;
mod snapshot;
mod types;

pub use cache::{SchemaCache, SnapshotReceiver, SnapshotSender};
pub use coerce::{coerce_json, coerce_text, CoercionError};
pub use errors::{SchemaError, SchemaResult};
pub use loader::SchemaLoader;
pub use snapshot::{SchemaOracle, SchemaSnapshot, SnapshotDocument};
pub use types::{ColumnInfo, ColumnType, ForeignKeyInfo, TableInfo, TableRef};
