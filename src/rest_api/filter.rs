//! # Filter Expression AST
//!
//! Typed filters parsed from query parameters. All filters on a request are
//! AND-combined.

use std::fmt;

use serde::Serialize;

use super::errors::{RestError, RestResult};

/// Filter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    /// Equals
    Eq,
    /// Not equals
    Neq,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
    /// Pattern match (LIKE)
    Like,
    /// Case-insensitive pattern match (ILIKE)
    Ilike,
    /// Value in list
    In,
    /// IS NULL / NOT NULL / TRUE / FALSE
    Is,
    /// Contains (`@>`)
    Cs,
    /// Overlaps (`&&`)
    Ov,
    /// Full-text search
    Fts,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 13] = [
        FilterOperator::Eq,
        FilterOperator::Neq,
        FilterOperator::Gt,
        FilterOperator::Gte,
        FilterOperator::Lt,
        FilterOperator::Lte,
        FilterOperator::Like,
        FilterOperator::Ilike,
        FilterOperator::In,
        FilterOperator::Is,
        FilterOperator::Cs,
        FilterOperator::Ov,
        FilterOperator::Fts,
    ];

    /// Get the operator string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Like => "like",
            FilterOperator::Ilike => "ilike",
            FilterOperator::In => "in",
            FilterOperator::Is => "is",
            FilterOperator::Cs => "cs",
            FilterOperator::Ov => "ov",
            FilterOperator::Fts => "fts",
        }
    }

    /// Parse an operator name; anything outside the closed set is rejected
    pub fn parse(s: &str) -> RestResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| RestError::UnknownOperator(s.to_string()))
    }

    /// SQL operator for binary comparisons
    pub fn sql(&self) -> &'static str {
        match self {
            FilterOperator::Eq => " = ",
            FilterOperator::Neq => " <> ",
            FilterOperator::Gt => " > ",
            FilterOperator::Gte => " >= ",
            FilterOperator::Lt => " < ",
            FilterOperator::Lte => " <= ",
            FilterOperator::Like => " LIKE ",
            FilterOperator::Ilike => " ILIKE ",
            FilterOperator::In => " IN ",
            FilterOperator::Is => " IS ",
            FilterOperator::Cs => " @> ",
            FilterOperator::Ov => " && ",
            FilterOperator::Fts => " @@ ",
        }
    }

    /// Operators whose value is a list
    pub fn takes_list(&self) -> bool {
        matches!(self, FilterOperator::In | FilterOperator::Ov)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single scalar filter operand
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl Scalar {
    /// Text form used when coercing against the column type
    pub fn as_text(&self) -> Option<String> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(b) => Some(b.to_string()),
            Scalar::Number(n) => Some(n.to_string()),
            Scalar::Text(s) => Some(s.clone()),
        }
    }
}

/// Closed set of `is` targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IsTarget {
    Null,
    NotNull,
    True,
    False,
}

impl IsTarget {
    pub fn parse(s: &str) -> RestResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "null" => Ok(IsTarget::Null),
            "not null" => Ok(IsTarget::NotNull),
            "true" => Ok(IsTarget::True),
            "false" => Ok(IsTarget::False),
            _ => Err(RestError::validation(
                "'is' accepts only null, not null, true or false",
            )),
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            IsTarget::Null => "NULL",
            IsTarget::NotNull => "NOT NULL",
            IsTarget::True => "TRUE",
            IsTarget::False => "FALSE",
        }
    }
}

/// Filter operand
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FilterValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
    Is(IsTarget),
}

/// A filter expression
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterExpression {
    /// Column to filter on
    pub column: String,

    /// JSON path below the column (`data->a->b`)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub json_path: Vec<String>,

    pub operator: FilterOperator,

    pub value: FilterValue,
}

impl FilterExpression {
    pub fn new(column: impl Into<String>, operator: FilterOperator, value: FilterValue) -> Self {
        Self {
            column: column.into(),
            json_path: Vec::new(),
            operator,
            value,
        }
    }

    /// Create an equality filter
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(
            column,
            FilterOperator::Eq,
            FilterValue::Scalar(Scalar::Text(value.into())),
        )
    }

    /// Create an "in list" filter
    pub fn in_list(column: impl Into<String>, values: Vec<String>) -> Self {
        Self::new(
            column,
            FilterOperator::In,
            FilterValue::List(values.into_iter().map(Scalar::Text).collect()),
        )
    }

    pub fn with_path(mut self, path: Vec<String>) -> Self {
        self.json_path = path;
        self
    }
}
