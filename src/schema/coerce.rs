//! Value coercion against column types
//!
//! Raw query-string text and JSON body values are converted to [`SqlValue`]s
//! of the column's type. Nothing is coerced silently: a value that does not
//! fit the column type is an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::types::ColumnType;
use crate::executor::SqlValue;

/// A value did not fit its column type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}, got {found}")]
pub struct CoercionError {
    pub expected: String,
    pub found: String,
}

impl CoercionError {
    fn new(ty: &ColumnType, found: impl Into<String>) -> Self {
        Self {
            expected: ty.pg_name(),
            found: found.into(),
        }
    }
}

pub type CoercionResult = Result<SqlValue, CoercionError>;

/// Coerce query-string text to the column type
pub fn coerce_text(raw: &str, ty: &ColumnType) -> CoercionResult {
    let quoted = || format!("'{}'", truncate(raw));
    match ty {
        ColumnType::SmallInt => parse_int(raw, ty, i16::MIN as i64, i16::MAX as i64),
        ColumnType::Integer => parse_int(raw, ty, i32::MIN as i64, i32::MAX as i64),
        ColumnType::BigInt => parse_int(raw, ty, i64::MIN, i64::MAX),
        ColumnType::Real | ColumnType::Double => raw
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(SqlValue::Float)
            .ok_or_else(|| CoercionError::new(ty, quoted())),
        ColumnType::Numeric => {
            if is_decimal(raw) {
                Ok(SqlValue::Numeric(raw.to_string()))
            } else {
                Err(CoercionError::new(ty, quoted()))
            }
        }
        ColumnType::Boolean => match raw.to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Ok(SqlValue::Bool(true)),
            "false" | "f" | "0" => Ok(SqlValue::Bool(false)),
            _ => Err(CoercionError::new(ty, quoted())),
        },
        ColumnType::Text | ColumnType::Other(_) => Ok(SqlValue::Text(raw.to_string())),
        ColumnType::Uuid => Uuid::parse_str(raw)
            .map(SqlValue::Uuid)
            .map_err(|_| CoercionError::new(ty, quoted())),
        ColumnType::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(SqlValue::Date)
            .map_err(|_| CoercionError::new(ty, quoted())),
        ColumnType::Time => parse_time(raw)
            .map(SqlValue::Time)
            .ok_or_else(|| CoercionError::new(ty, quoted())),
        ColumnType::Timestamp => parse_naive_timestamp(raw)
            .map(SqlValue::Timestamp)
            .ok_or_else(|| CoercionError::new(ty, quoted())),
        ColumnType::TimestampTz => parse_timestamptz(raw)
            .map(SqlValue::TimestampTz)
            .ok_or_else(|| CoercionError::new(ty, quoted())),
        ColumnType::Bytea => match raw.strip_prefix("\\x") {
            Some(hex) => decode_hex(hex)
                .map(SqlValue::Bytes)
                .ok_or_else(|| CoercionError::new(ty, quoted())),
            None => Ok(SqlValue::Bytes(raw.as_bytes().to_vec())),
        },
        ColumnType::Json | ColumnType::Jsonb => serde_json::from_str::<Value>(raw)
            .map(SqlValue::Json)
            .map_err(|_| CoercionError::new(ty, "invalid JSON")),
        ColumnType::TsVector | ColumnType::Array(_) => {
            Err(CoercionError::new(ty, "a scalar value"))
        }
    }
}

/// Coerce a JSON body value to the column type
pub fn coerce_json(value: &Value, ty: &ColumnType) -> CoercionResult {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    match ty {
        ColumnType::Json | ColumnType::Jsonb => Ok(SqlValue::Json(value.clone())),

        ColumnType::SmallInt | ColumnType::Integer | ColumnType::BigInt => match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => coerce_text(&i.to_string(), ty),
                None => Err(CoercionError::new(ty, format!("number {}", n))),
            },
            Value::String(s) => coerce_text(s, ty),
            other => Err(CoercionError::new(ty, json_kind(other))),
        },

        ColumnType::Real | ColumnType::Double => match value {
            Value::Number(n) => n
                .as_f64()
                .map(SqlValue::Float)
                .ok_or_else(|| CoercionError::new(ty, format!("number {}", n))),
            Value::String(s) => coerce_text(s, ty),
            other => Err(CoercionError::new(ty, json_kind(other))),
        },

        ColumnType::Numeric => match value {
            Value::Number(n) => Ok(SqlValue::Numeric(n.to_string())),
            Value::String(s) => coerce_text(s, ty),
            other => Err(CoercionError::new(ty, json_kind(other))),
        },

        ColumnType::Boolean => match value {
            Value::Bool(b) => Ok(SqlValue::Bool(*b)),
            other => Err(CoercionError::new(ty, json_kind(other))),
        },

        ColumnType::Array(inner) => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| coerce_json(item, inner))
                .collect::<Result<Vec<_>, _>>()
                .map(SqlValue::Array),
            other => Err(CoercionError::new(ty, json_kind(other))),
        },

        ColumnType::TsVector => Err(CoercionError::new(ty, "a writable value")),

        // Remaining types are written as strings in JSON
        _ => match value {
            Value::String(s) => coerce_text(s, ty),
            other => Err(CoercionError::new(ty, json_kind(other))),
        },
    }
}

fn parse_int(raw: &str, ty: &ColumnType, min: i64, max: i64) -> CoercionResult {
    match raw.parse::<i64>() {
        Ok(v) if v >= min && v <= max => Ok(SqlValue::Int(v)),
        Ok(_) => Err(CoercionError::new(ty, "an out-of-range integer")),
        Err(_) => Err(CoercionError::new(ty, format!("'{}'", truncate(raw)))),
    }
}

/// `[+-]digits[.digits][e[+-]digits]` or `NaN`
fn is_decimal(raw: &str) -> bool {
    if raw.eq_ignore_ascii_case("nan") {
        return true;
    }
    let s = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    let (mantissa, exponent) = match s.find(['e', 'E']) {
        Some(idx) => (&s[..idx], Some(&s[idx + 1..])),
        None => (s, None),
    };
    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((i, f)) => (i, f),
        None => (mantissa, ""),
    };
    let digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    if int_part.is_empty() && frac_part.is_empty() {
        return false;
    }
    if !digits(int_part) || !digits(frac_part) {
        return false;
    }
    match exponent {
        None => true,
        Some(exp) => {
            let exp = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            !exp.is_empty() && digits(exp)
        }
    }
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

fn parse_naive_timestamp(raw: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

fn parse_timestamptz(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // Offset-less input is taken as UTC
    parse_naive_timestamp(raw).map(|naive| naive.and_utc())
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|b| u8::from_str_radix(b, 16).ok()))
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Keep offending input out of long error messages
fn truncate(raw: &str) -> String {
    const MAX: usize = 32;
    if raw.chars().count() <= MAX {
        raw.to_string()
    } else {
        let head: String = raw.chars().take(MAX).collect();
        format!("{}...", head)
    }
}
