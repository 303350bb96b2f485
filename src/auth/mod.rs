//! # Auth Module
//!
//! Identity for the gateway: bearer tokens become a [`SecurityContext`],
//! and the [`SecurityContextBinder`] carries that context onto exactly one
//! pooled database session for one request. Row filtering itself is left
//! to the database's RLS policies.

pub mod binder;
pub mod context;
pub mod errors;
pub mod resolver;

pub use binder::{BoundSession, SecurityContextBinder};
pub use context::SecurityContext;
pub use errors::{AuthError, AuthResult};
pub use resolver::{AuthResolver, JwtAuthResolver};
