//! Parameter encoding and row decoding for tokio-postgres
//!
//! Parameters are encoded against the type the server inferred for each
//! placeholder. Numeric values travel as text (the builder casts
//! `$n::text::numeric`), so no decimal crate is needed on the way in.
//! On the way out `numeric` is decoded from its binary form into a decimal
//! string.

use std::error::Error;
use std::fmt::Write as _;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde_json::Value;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, Kind, ToSql, Type};
use tokio_postgres::Row as PgRow;
use uuid::Uuid;

use crate::executor::{DriverError, Row, SqlValue};

type BoxError = Box<dyn Error + Sync + Send>;

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

fn is_text(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(b) => b.to_sql(ty, out),
            SqlValue::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::INT8 => i.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                _ => i.to_string().as_str().to_sql(ty, out),
            },
            SqlValue::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::FLOAT8 => f.to_sql(ty, out),
                _ => f.to_string().as_str().to_sql(ty, out),
            },
            SqlValue::Numeric(s) | SqlValue::Text(s) => s.as_str().to_sql(ty, out),
            SqlValue::Json(v) => {
                if is_text(ty) {
                    v.to_string().as_str().to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            SqlValue::Uuid(u) => {
                if is_text(ty) {
                    u.to_string().as_str().to_sql(ty, out)
                } else {
                    u.to_sql(ty, out)
                }
            }
            SqlValue::Date(d) => d.to_sql(ty, out),
            SqlValue::Time(t) => t.to_sql(ty, out),
            SqlValue::Timestamp(ts) => match *ty {
                Type::TIMESTAMPTZ => Utc.from_utc_datetime(ts).to_sql(ty, out),
                _ => ts.to_sql(ty, out),
            },
            SqlValue::TimestampTz(ts) => match *ty {
                Type::TIMESTAMP => ts.naive_utc().to_sql(ty, out),
                _ => ts.to_sql(ty, out),
            },
            SqlValue::Bytes(b) => b.as_slice().to_sql(ty, out),
            SqlValue::Array(items) => match ty.kind() {
                Kind::Array(_) => items.as_slice().to_sql(ty, out),
                _ => Err(format!("cannot bind an array as {}", ty).into()),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// `numeric` decoded to its exact decimal text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgNumeric(pub String);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        decode_numeric(raw).map(PgNumeric)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn read_u16(raw: &[u8], at: usize) -> Result<u16, BoxError> {
    raw.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| "truncated numeric".into())
}

/// Decode the binary `numeric` wire format
///
/// Layout: ndigits, weight, sign, dscale (all 16-bit), then `ndigits`
/// base-10000 digits. Digit `i` has place value `10000^(weight - i)`.
pub fn decode_numeric(raw: &[u8]) -> Result<String, BoxError> {
    let ndigits = read_u16(raw, 0)? as usize;
    let weight = read_u16(raw, 2)? as i16 as i32;
    let sign = read_u16(raw, 4)?;
    let dscale = read_u16(raw, 6)? as usize;

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let mut digits = Vec::with_capacity(ndigits);
    for i in 0..ndigits {
        digits.push(read_u16(raw, 8 + i * 2)?);
    }
    let digit_at = |idx: i32| -> u16 {
        if idx < 0 {
            0
        } else {
            digits.get(idx as usize).copied().unwrap_or(0)
        }
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for idx in 0..=weight {
            if idx == 0 {
                write!(out, "{}", digit_at(idx))?;
            } else {
                write!(out, "{:04}", digit_at(idx))?;
            }
        }
    }

    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut idx = weight + 1;
        while frac.len() < dscale {
            write!(frac, "{:04}", digit_at(idx))?;
            idx += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }
    Ok(out)
}

/// Map a tokio-postgres error onto the driver taxonomy
pub fn driver_error(err: tokio_postgres::Error) -> DriverError {
    if let Some(db) = err.as_db_error() {
        DriverError::database(db.code().code(), db.message())
    } else if err.is_closed() {
        DriverError::Closed(err.to_string())
    } else {
        DriverError::Protocol(err.to_string())
    }
}

fn scalar<'a, T, F>(row: &'a PgRow, idx: usize, f: F) -> Result<SqlValue, tokio_postgres::Error>
where
    T: FromSql<'a>,
    F: FnOnce(T) -> SqlValue,
{
    Ok(row
        .try_get::<_, Option<T>>(idx)?
        .map(f)
        .unwrap_or(SqlValue::Null))
}

fn array<'a, T, F>(row: &'a PgRow, idx: usize, f: F) -> Result<SqlValue, tokio_postgres::Error>
where
    T: FromSql<'a>,
    F: Fn(T) -> SqlValue,
{
    Ok(match row.try_get::<_, Option<Vec<Option<T>>>>(idx)? {
        None => SqlValue::Null,
        Some(items) => SqlValue::Array(
            items
                .into_iter()
                .map(|item| item.map(&f).unwrap_or(SqlValue::Null))
                .collect(),
        ),
    })
}

fn decode_value(row: &PgRow, idx: usize, ty: &Type) -> Result<SqlValue, tokio_postgres::Error> {
    if let Kind::Array(member) = ty.kind() {
        return match *member {
            Type::BOOL => array(row, idx, SqlValue::Bool),
            Type::INT2 => array(row, idx, |v: i16| SqlValue::Int(v as i64)),
            Type::INT4 => array(row, idx, |v: i32| SqlValue::Int(v as i64)),
            Type::INT8 => array(row, idx, SqlValue::Int),
            Type::FLOAT4 => array(row, idx, |v: f32| SqlValue::Float(v as f64)),
            Type::FLOAT8 => array(row, idx, SqlValue::Float),
            Type::NUMERIC => array(row, idx, |v: PgNumeric| SqlValue::Numeric(v.0)),
            Type::UUID => array(row, idx, SqlValue::Uuid),
            Type::JSON | Type::JSONB => array(row, idx, SqlValue::Json),
            Type::DATE => array(row, idx, SqlValue::Date),
            Type::TIMESTAMPTZ => array(row, idx, SqlValue::TimestampTz),
            _ => array(row, idx, SqlValue::Text),
        };
    }

    match *ty {
        Type::BOOL => scalar(row, idx, SqlValue::Bool),
        Type::INT2 => scalar(row, idx, |v: i16| SqlValue::Int(v as i64)),
        Type::INT4 => scalar(row, idx, |v: i32| SqlValue::Int(v as i64)),
        Type::INT8 => scalar(row, idx, SqlValue::Int),
        Type::OID => scalar(row, idx, |v: u32| SqlValue::Int(v as i64)),
        Type::FLOAT4 => scalar(row, idx, |v: f32| SqlValue::Float(v as f64)),
        Type::FLOAT8 => scalar(row, idx, SqlValue::Float),
        Type::NUMERIC => scalar(row, idx, |v: PgNumeric| SqlValue::Numeric(v.0)),
        Type::JSON | Type::JSONB => scalar(row, idx, |v: Value| SqlValue::Json(v)),
        Type::UUID => scalar(row, idx, |v: Uuid| SqlValue::Uuid(v)),
        Type::DATE => scalar(row, idx, |v: NaiveDate| SqlValue::Date(v)),
        Type::TIME => scalar(row, idx, |v: NaiveTime| SqlValue::Time(v)),
        Type::TIMESTAMP => scalar(row, idx, |v: NaiveDateTime| SqlValue::Timestamp(v)),
        Type::TIMESTAMPTZ => scalar(row, idx, |v: DateTime<Utc>| SqlValue::TimestampTz(v)),
        Type::BYTEA => scalar(row, idx, |v: Vec<u8>| SqlValue::Bytes(v)),
        _ => scalar(row, idx, SqlValue::Text),
    }
}

/// Decode one row in column order
pub fn decode_row(row: &PgRow) -> Result<Row, DriverError> {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_value(row, idx, column.type_()).map_err(|err| {
            DriverError::Protocol(format!(
                "cannot decode column {} of type {}: {}",
                column.name(),
                column.type_(),
                err
            ))
        })?;
        out.push(column.name(), value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(ndigits: u16, weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        for v in [ndigits, weight as u16, sign, dscale] {
            raw.extend_from_slice(&v.to_be_bytes());
        }
        for d in digits {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        raw
    }

    #[test]
    fn test_decode_numeric() {
        // 12345.678
        let raw = numeric(3, 1, 0, 3, &[1, 2345, 6780]);
        assert_eq!(decode_numeric(&raw).unwrap(), "12345.678");

        // -0.0042
        let raw = numeric(1, -1, NUMERIC_NEG, 4, &[42]);
        assert_eq!(decode_numeric(&raw).unwrap(), "-0.0042");

        // 20000 (trailing zero groups elided)
        let raw = numeric(1, 1, 0, 0, &[2]);
        assert_eq!(decode_numeric(&raw).unwrap(), "20000");

        let raw = numeric(0, 0, NUMERIC_NAN, 0, &[]);
        assert_eq!(decode_numeric(&raw).unwrap(), "NaN");
    }

    #[test]
    fn test_truncated_numeric() {
        assert!(decode_numeric(&[0, 1]).is_err());
    }

    #[test]
    fn test_int_binds_to_narrow_type() {
        let mut out = BytesMut::new();
        SqlValue::Int(7).to_sql(&Type::INT4, &mut out).unwrap();
        assert_eq!(&out[..], &7i32.to_be_bytes());

        let mut out = BytesMut::new();
        assert!(SqlValue::Int(i64::MAX).to_sql(&Type::INT2, &mut out).is_err());
    }

    #[test]
    fn test_numeric_binds_as_text() {
        let mut out = BytesMut::new();
        SqlValue::Numeric("1.50".into())
            .to_sql(&Type::TEXT, &mut out)
            .unwrap();
        assert_eq!(&out[..], b"1.50");
    }
}
