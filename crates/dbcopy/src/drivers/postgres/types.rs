//! Conversion between PostgreSQL wire types and [`SqlValue`].
//!
//! Reads decode by the column's reported type. Writes go through [`PgParam`],
//! which coerces a value to the parameter type the server inferred for it,
//! so a row read from another product (an `I16` boolean, a decimal headed
//! for a `double precision` column) binds without a cast in the SQL.

use std::error::Error as StdError;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use uuid::Uuid;

use crate::core::value::{Row, SqlValue};
use crate::error::{CopyError, Result};

type BoxError = Box<dyn StdError + Sync + Send>;

/// Decode a full result row.
pub fn decode_row(row: &tokio_postgres::Row) -> Result<Row> {
    let mut out = Row::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        out.push(column.name(), decode_value(row, idx, column.type_())?);
    }
    Ok(out)
}

fn get<'a, T: FromSql<'a>>(
    row: &'a tokio_postgres::Row,
    idx: usize,
    wrap: impl FnOnce(T) -> SqlValue,
) -> Result<SqlValue> {
    Ok(row
        .try_get::<_, Option<T>>(idx)?
        .map(wrap)
        .unwrap_or(SqlValue::Null))
}

/// Decode one column by its PostgreSQL type.
pub fn decode_value(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Result<SqlValue> {
    match *ty {
        Type::BOOL => get(row, idx, SqlValue::Bool),
        Type::INT2 => get(row, idx, SqlValue::I16),
        Type::INT4 => get(row, idx, SqlValue::I32),
        Type::INT8 => get(row, idx, SqlValue::I64),
        Type::OID => get(row, idx, |v: u32| SqlValue::I64(i64::from(v))),
        Type::FLOAT4 => get(row, idx, SqlValue::F32),
        Type::FLOAT8 => get(row, idx, SqlValue::F64),
        Type::NUMERIC => get(row, idx, SqlValue::Decimal),
        Type::BYTEA => get(row, idx, SqlValue::Bytes),
        Type::UUID => get(row, idx, SqlValue::Uuid),
        Type::TIMESTAMP => get(row, idx, SqlValue::DateTime),
        Type::TIMESTAMPTZ => get(row, idx, SqlValue::DateTimeOffset),
        Type::DATE => get(row, idx, SqlValue::Date),
        Type::TIME => get(row, idx, SqlValue::Time),
        Type::JSON | Type::JSONB => get(row, idx, |v: serde_json::Value| {
            SqlValue::Text(v.to_string())
        }),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            get(row, idx, SqlValue::Text)
        }
        _ => {
            // citext, xml, enums and other text-like types
            row.try_get::<_, Option<String>>(idx)
                .map(|v| v.map(SqlValue::Text).unwrap_or(SqlValue::Null))
                .map_err(|_| {
                    CopyError::Store(format!(
                        "column {} has unsupported PostgreSQL type {}",
                        row.columns()[idx].name(),
                        ty
                    ))
                })
        }
    }
}

/// A row value bound as a statement parameter.
#[derive(Debug)]
pub struct PgParam<'a>(pub &'a SqlValue);

fn integer_to_sql(n: i64, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(n)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(n)?.to_sql(ty, out),
        Type::INT8 => n.to_sql(ty, out),
        Type::BOOL => (n != 0).to_sql(ty, out),
        Type::FLOAT4 => (n as f32).to_sql(ty, out),
        Type::FLOAT8 => (n as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(n).to_sql(ty, out),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR => n.to_string().to_sql(ty, out),
        _ => n.to_sql_checked(ty, out),
    }
}

fn float_to_sql(f: f64, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT4 => (f as f32).to_sql(ty, out),
        Type::FLOAT8 => f.to_sql(ty, out),
        Type::NUMERIC => Decimal::from_f64(f)
            .ok_or_else(|| format!("{} cannot be stored as numeric", f))?
            .to_sql(ty, out),
        _ => f.to_sql_checked(ty, out),
    }
}

fn midnight(date: &NaiveDate) -> std::result::Result<NaiveDateTime, BoxError> {
    date.and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("invalid date {}", date).into())
}

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self.0 {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                _ => integer_to_sql(i64::from(*b), ty, out),
            },
            SqlValue::I16(v) => integer_to_sql(i64::from(*v), ty, out),
            SqlValue::I32(v) => integer_to_sql(i64::from(*v), ty, out),
            SqlValue::I64(v) => integer_to_sql(*v, ty, out),
            SqlValue::F32(v) => match *ty {
                Type::FLOAT4 => v.to_sql(ty, out),
                _ => float_to_sql(f64::from(*v), ty, out),
            },
            SqlValue::F64(v) => float_to_sql(*v, ty, out),
            SqlValue::Decimal(d) => match *ty {
                Type::FLOAT4 | Type::FLOAT8 => float_to_sql(
                    d.to_f64()
                        .ok_or_else(|| format!("{} cannot be stored as a float", d))?,
                    ty,
                    out,
                ),
                Type::INT2 | Type::INT4 | Type::INT8 if d.fract().is_zero() => integer_to_sql(
                    d.to_i64()
                        .ok_or_else(|| format!("{} is out of integer range", d))?,
                    ty,
                    out,
                ),
                _ => d.to_sql_checked(ty, out),
            },
            SqlValue::Text(s) => match *ty {
                Type::UUID => Uuid::parse_str(s.trim())?.to_sql(ty, out),
                Type::JSON | Type::JSONB => {
                    serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out)
                }
                _ => s.to_sql_checked(ty, out),
            },
            SqlValue::Bytes(b) => b.to_sql_checked(ty, out),
            SqlValue::Uuid(u) => match *ty {
                Type::UUID => u.to_sql(ty, out),
                _ => u.to_string().to_sql_checked(ty, out),
            },
            SqlValue::DateTime(dt) => match *ty {
                Type::TIMESTAMPTZ => {
                    DateTime::<Utc>::from_naive_utc_and_offset(*dt, Utc).to_sql(ty, out)
                }
                Type::DATE => dt.date().to_sql(ty, out),
                _ => dt.to_sql_checked(ty, out),
            },
            SqlValue::DateTimeOffset(dt) => match *ty {
                Type::TIMESTAMP => dt.naive_utc().to_sql(ty, out),
                _ => dt.to_sql_checked(ty, out),
            },
            SqlValue::Date(d) => match *ty {
                Type::TIMESTAMP => midnight(d)?.to_sql(ty, out),
                Type::TIMESTAMPTZ => {
                    DateTime::<Utc>::from_naive_utc_and_offset(midnight(d)?, Utc).to_sql(ty, out)
                }
                _ => d.to_sql_checked(ty, out),
            },
            SqlValue::Time(t) => t.to_sql_checked(ty, out),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Wrap row values as statement parameters.
pub fn params<'a, I>(values: I) -> Vec<PgParam<'a>>
where
    I: IntoIterator<Item = &'a SqlValue>,
{
    values.into_iter().map(PgParam).collect()
}

/// Borrow wrapped parameters in the form `tokio-postgres` expects.
pub fn param_refs<'a>(params: &'a [PgParam<'_>]) -> Vec<&'a (dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: SqlValue, ty: Type) -> std::result::Result<(IsNull, BytesMut), BoxError> {
        let mut out = BytesMut::new();
        let is_null = PgParam(&value).to_sql_checked(&ty, &mut out)?;
        Ok((is_null, out))
    }

    #[test]
    fn test_null_encodes_as_null_for_any_type() {
        let (is_null, out) = encode(SqlValue::Null, Type::INT4).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(out.is_empty());
    }

    #[test]
    fn test_integer_narrows_to_column_width() {
        let (_, out) = encode(SqlValue::I64(7), Type::INT2).unwrap();
        assert_eq!(&out[..], &7i16.to_be_bytes());

        assert!(encode(SqlValue::I64(70_000), Type::INT2).is_err());
    }

    #[test]
    fn test_small_integer_into_boolean() {
        let (_, out) = encode(SqlValue::I16(1), Type::BOOL).unwrap();
        assert_eq!(&out[..], &[1u8]);
    }

    #[test]
    fn test_bool_into_integer_column() {
        let (_, out) = encode(SqlValue::Bool(true), Type::INT4).unwrap();
        assert_eq!(&out[..], &1i32.to_be_bytes());
    }

    #[test]
    fn test_decimal_into_double() {
        let (_, out) = encode(SqlValue::Decimal(Decimal::new(125, 1)), Type::FLOAT8).unwrap();
        assert_eq!(&out[..], &12.5f64.to_be_bytes());
    }

    #[test]
    fn test_text_uuid_into_uuid_column() {
        let id = Uuid::new_v4();
        let (_, out) = encode(SqlValue::Text(id.to_string()), Type::UUID).unwrap();
        assert_eq!(&out[..], id.as_bytes());
    }

    #[test]
    fn test_text_into_integer_column_is_rejected() {
        assert!(encode(SqlValue::Text("abc".into()), Type::INT4).is_err());
    }
}
