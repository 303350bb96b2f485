//! Row conversion
//!
//! | SQL value      | JSON                                  |
//! |----------------|---------------------------------------|
//! | int, float     | number (non-finite floats as strings) |
//! | numeric        | number if exact, otherwise string     |
//! | bool           | boolean                               |
//! | json/jsonb     | parsed value                          |
//! | arrays         | arrays                                |
//! | uuid, text     | string                                |
//! | date           | `YYYY-MM-DD`                          |
//! | time           | `HH:MM:SS[.f]`                        |
//! | timestamp      | ISO-8601 without offset               |
//! | timestamptz    | RFC 3339, UTC                         |
//! | bytea          | `\x` hex string                       |

use chrono::SecondsFormat;
use serde_json::{Map, Number, Value};

use super::value::{Row, SqlValue};

/// Convert one value
pub fn value_to_json(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Bool(*b),
        SqlValue::Int(i) => Value::Number((*i).into()),
        SqlValue::Float(f) => match Number::from_f64(*f) {
            Some(n) => Value::Number(n),
            None => Value::String(f.to_string()),
        },
        SqlValue::Numeric(s) => match s.parse::<Number>() {
            Ok(n) if trim_decimal(&n.to_string()) == trim_decimal(s) => Value::Number(n),
            _ => Value::String(s.clone()),
        },
        SqlValue::Text(s) => Value::String(s.clone()),
        SqlValue::Json(v) => v.clone(),
        SqlValue::Uuid(u) => Value::String(u.to_string()),
        SqlValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        SqlValue::Time(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
        SqlValue::Timestamp(ts) => Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        SqlValue::TimestampTz(ts) => {
            Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }
        SqlValue::Bytes(bytes) => {
            let mut hex = String::with_capacity(2 + bytes.len() * 2);
            hex.push_str("\\x");
            for b in bytes {
                hex.push_str(&format!("{:02x}", b));
            }
            Value::String(hex)
        }
        SqlValue::Array(items) => Value::Array(items.iter().map(value_to_json).collect()),
    }
}

/// `12.50` and `12.5` denote the same value
fn trim_decimal(s: &str) -> &str {
    if s.contains('.') && !s.contains(|c: char| c == 'e' || c == 'E') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Convert one row into an object, preserving projection order
pub fn row_to_json(row: &Row) -> Value {
    let mut obj = Map::with_capacity(row.len());
    for (column, value) in row.iter() {
        obj.insert(column.to_string(), value_to_json(value));
    }
    Value::Object(obj)
}

pub fn rows_to_json(rows: &[Row]) -> Value {
    Value::Array(rows.iter().map(row_to_json).collect())
}
