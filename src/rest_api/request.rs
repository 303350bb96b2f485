//! # Query Requests
//!
//! The typed, validated-shape request handed to the query builder. A
//! `QueryRequest` is built once per HTTP request and never mutated.

use serde::Serialize;

use super::errors::{RestError, RestResult};
use super::filter::FilterExpression;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// NULL placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NullsOrder {
    #[default]
    Default,
    First,
    Last,
}

/// One ORDER BY term
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSpec {
    pub column: String,
    pub direction: Direction,
    pub nulls: NullsOrder,
}

impl OrderSpec {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
            nulls: NullsOrder::Default,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
            nulls: NullsOrder::Default,
        }
    }
}

/// Page bounds; `0 <= limit <= max_limit`, `offset >= 0`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    limit: u64,
    offset: u64,
}

/// Limit policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_limit: u64,
    pub default_limit: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_limit: 1000,
            default_limit: 100,
        }
    }
}

impl Pagination {
    /// Clamp `limit` to the maximum; negative values are rejected, not clamped
    pub fn new(limit: Option<i64>, offset: Option<i64>, limits: &Limits) -> RestResult<Self> {
        let limit = match limit {
            None => limits.default_limit.min(limits.max_limit),
            Some(l) if l < 0 => {
                return Err(RestError::validation("limit must not be negative"));
            }
            Some(l) => (l as u64).min(limits.max_limit),
        };
        let offset = match offset {
            None => 0,
            Some(o) if o < 0 => {
                return Err(RestError::validation("offset must not be negative"));
            }
            Some(o) => o as u64,
        };
        Ok(Self { limit, offset })
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// A projected column, optionally renamed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnSpec {
    Star,
    Column {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
}

impl ColumnSpec {
    pub fn named(name: impl Into<String>) -> Self {
        ColumnSpec::Column {
            name: name.into(),
            alias: None,
        }
    }
}

/// An embedded related resource: `[alias:]table[!hint](columns)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedSpec {
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Foreign key name or column disambiguating the relationship
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub select: Vec<ColumnSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<EmbedSpec>,
}

impl EmbedSpec {
    pub fn new(table: impl Into<String>, select: Vec<ColumnSpec>) -> Self {
        Self {
            table: table.into(),
            alias: None,
            hint: None,
            select,
            embeds: Vec::new(),
        }
    }

    /// Key the embedded value appears under in each row
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

/// Syntactic result of parsing a query string, before request policy
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedQuery {
    pub select: Vec<ColumnSpec>,
    pub embeds: Vec<EmbedSpec>,
    pub filters: Vec<FilterExpression>,
    pub order: Vec<OrderSpec>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Read request against one table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
    schema: String,
    table: String,
    filters: Vec<FilterExpression>,
    order: Vec<OrderSpec>,
    pagination: Pagination,
    select: Vec<ColumnSpec>,
    embeds: Vec<EmbedSpec>,
}

impl QueryRequest {
    /// Build a read request from a parsed query
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        parsed: ParsedQuery,
        limits: &Limits,
    ) -> RestResult<Self> {
        let pagination = Pagination::new(parsed.limit, parsed.offset, limits)?;
        Ok(Self {
            schema: schema.into(),
            table: table.into(),
            filters: parsed.filters,
            order: parsed.order,
            pagination,
            select: normalize_select(parsed.select, &parsed.embeds),
            embeds: parsed.embeds,
        })
    }

    /// Request shape used for mutations: filters and projection only
    pub fn for_mutation(
        schema: impl Into<String>,
        table: impl Into<String>,
        parsed: ParsedQuery,
    ) -> RestResult<Self> {
        if parsed.limit.is_some() || parsed.offset.is_some() {
            return Err(RestError::validation(
                "limit and offset are not allowed on mutations",
            ));
        }
        if !parsed.order.is_empty() {
            return Err(RestError::validation("order is not allowed on mutations"));
        }
        Ok(Self {
            schema: schema.into(),
            table: table.into(),
            filters: parsed.filters,
            order: Vec::new(),
            pagination: Pagination {
                limit: 0,
                offset: 0,
            },
            select: normalize_select(parsed.select, &parsed.embeds),
            embeds: parsed.embeds,
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn filters(&self) -> &[FilterExpression] {
        &self.filters
    }

    pub fn order(&self) -> &[OrderSpec] {
        &self.order
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    pub fn select(&self) -> &[ColumnSpec] {
        &self.select
    }

    pub fn embeds(&self) -> &[EmbedSpec] {
        &self.embeds
    }
}

/// No explicit columns means `*`, unless only embeds were listed
fn normalize_select(select: Vec<ColumnSpec>, embeds: &[EmbedSpec]) -> Vec<ColumnSpec> {
    if select.is_empty() && embeds.is_empty() {
        vec![ColumnSpec::Star]
    } else {
        select
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> Limits {
        Limits {
            max_limit: 1000,
            default_limit: 100,
        }
    }

    #[test]
    fn test_limit_boundaries() {
        let l = limits();
        assert_eq!(Pagination::new(Some(999), None, &l).unwrap().limit(), 999);
        assert_eq!(Pagination::new(Some(1000), None, &l).unwrap().limit(), 1000);
        assert_eq!(Pagination::new(Some(1001), None, &l).unwrap().limit(), 1000);
        assert_eq!(Pagination::new(Some(0), None, &l).unwrap().limit(), 0);
        assert_eq!(
            Pagination::new(Some(-1), None, &l).unwrap_err().code(),
            "VALIDATION_ERROR"
        );
    }

    #[test]
    fn test_default_limit_and_offset() {
        let p = Pagination::new(None, None, &limits()).unwrap();
        assert_eq!(p.limit(), 100);
        assert_eq!(p.offset(), 0);
        assert!(Pagination::new(None, Some(-5), &limits()).is_err());
        assert_eq!(
            Pagination::new(None, Some(1_000_000), &limits())
                .unwrap()
                .offset(),
            1_000_000
        );
    }

    #[test]
    fn test_mutation_rejects_paging() {
        let parsed = ParsedQuery {
            limit: Some(5),
            ..Default::default()
        };
        assert!(QueryRequest::for_mutation("public", "todos", parsed).is_err());

        let parsed = ParsedQuery {
            order: vec![OrderSpec::asc("id")],
            ..Default::default()
        };
        assert!(QueryRequest::for_mutation("public", "todos", parsed).is_err());
    }

    #[test]
    fn test_empty_select_is_star() {
        let req =
            QueryRequest::new("public", "todos", ParsedQuery::default(), &limits()).unwrap();
        assert_eq!(req.select(), &[ColumnSpec::Star]);
    }
}
