//! # REST API Module
//!
//! Translates untrusted query parameters and JSON bodies into
//! parameterized SQL against a schema snapshot, then runs it through the
//! executor under the caller's identity.
//!
//! Identifiers reach SQL text only after a snapshot lookup; every value
//! travels as a bound parameter.

mod builder;
pub mod embed;
pub mod errors;
pub mod filter;
pub mod handler;
mod mutation;
pub mod parser;
pub mod prefer;
pub mod request;
pub mod response;
pub mod sql;

pub use builder::QueryBuilder;
pub use embed::{Cardinality, Relationship, RelationshipResolver};
pub use errors::{RestError, RestResult};
pub use filter::{FilterExpression, FilterOperator, FilterValue, IsTarget, Scalar};
pub use handler::{compile_plan, plan_request, Method, RequestState, RestApi, RestRequest};
pub use parser::{parse_params, parse_query_string};
pub use prefer::{Preferences, ReturnPreference};
pub use request::{
    ColumnSpec, Direction, EmbedSpec, Limits, NullsOrder, OrderSpec, Pagination, ParsedQuery,
    QueryRequest,
};
pub use response::{ApiError, ApiResponse};
pub use sql::{BoundParams, QueryPlan, SqlTemplate, StatementKind};
