//! Cross-dialect value comparison.
//!
//! Values read back from a different product rarely come back in the same
//! variant they were written as: an `int4` may return as `bigint`, a decimal
//! corrected to a double returns as a float, a UUID stored as `char(36)`
//! returns as text. Comparison rules:
//!
//! - NULL equals NULL and nothing else
//! - integers compare by value across widths; booleans equal 0/1
//! - decimals compare with integers exactly and with floats after
//!   converting the decimal to the float's width
//! - temporal values match when they differ by strictly less than the
//!   tolerance; naive timestamps are taken as UTC against offset timestamps
//! - UUIDs equal their canonical text form
//! - anything else requires strict equality

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};
use rust_decimal::prelude::ToPrimitive;

use crate::core::value::{Row, SqlValue};

/// Column name to (source value, destination value) for every mismatch.
pub type FieldDiff = BTreeMap<String, (SqlValue, SqlValue)>;

/// Exact value equality across representations. Temporal values must be
/// identical.
pub fn values_match(a: &SqlValue, b: &SqlValue) -> bool {
    use SqlValue::*;

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }

    match (a, b) {
        (Null, Null) => true,
        (Null, _) | (_, Null) => false,

        (Bool(x), other) | (other, Bool(x)) if other.as_i64().is_some() => {
            other.as_i64() == Some(i64::from(*x))
        }

        (F32(x), F32(y)) => x == y,
        (F64(x), F64(y)) => x == y,
        (F32(x), F64(y)) | (F64(y), F32(x)) => *x == *y as f32,

        (Decimal(x), Decimal(y)) => x == y,
        (Decimal(d), other) | (other, Decimal(d)) if other.as_i64().is_some() => {
            other.as_i64().map(rust_decimal::Decimal::from) == Some(*d)
        }
        (Decimal(d), F64(f)) | (F64(f), Decimal(d)) => d.to_f64() == Some(*f),
        (Decimal(d), F32(f)) | (F32(f), Decimal(d)) => d.to_f32() == Some(*f),

        (F64(f), other) | (other, F64(f)) if other.as_i64().is_some() => {
            other.as_i64().map(|n| n as f64) == Some(*f)
        }
        (F32(f), other) | (other, F32(f)) if other.as_i64().is_some() => {
            other.as_i64().map(|n| n as f32) == Some(*f)
        }

        (Uuid(u), Text(s)) | (Text(s), Uuid(u)) => u.to_string().eq_ignore_ascii_case(s.trim()),

        _ if a.is_temporal() && b.is_temporal() => {
            temporal_delta(a, b).is_some_and(|d| d.is_zero())
        }

        _ => a == b,
    }
}

/// Field comparison used by the verifier.
pub fn compare_values(a: &SqlValue, b: &SqlValue, tolerance: Duration) -> bool {
    if a.is_temporal() && b.is_temporal() {
        return match (temporal_delta(a, b), TimeDelta::from_std(tolerance)) {
            (Some(delta), Ok(limit)) => delta.is_zero() || delta < limit,
            _ => false,
        };
    }
    values_match(a, b)
}

/// Every column of `source` whose destination value does not compare equal.
/// A column missing from `destination` compares as NULL.
pub fn diff_rows(source: &Row, destination: &Row, tolerance: Duration) -> FieldDiff {
    let mut diff = FieldDiff::new();
    for (column, src) in source.iter() {
        let dst = destination.get(column).cloned().unwrap_or(SqlValue::Null);
        if !compare_values(src, &dst, tolerance) {
            diff.insert(column.to_string(), (src.clone(), dst));
        }
    }
    diff
}

/// Absolute difference between two temporal values of compatible kinds.
pub(crate) fn temporal_delta(a: &SqlValue, b: &SqlValue) -> Option<TimeDelta> {
    use SqlValue::*;

    let delta = match (a, b) {
        (DateTime(x), DateTime(y)) => x.signed_duration_since(*y),
        (DateTimeOffset(x), DateTimeOffset(y)) => x.signed_duration_since(*y),
        (DateTime(naive), DateTimeOffset(aware)) | (DateTimeOffset(aware), DateTime(naive)) => {
            aware.naive_utc().signed_duration_since(*naive)
        }
        (Date(x), Date(y)) => x.signed_duration_since(*y),
        (Date(d), DateTime(t)) | (DateTime(t), Date(d)) => {
            let midnight: NaiveDateTime = d.and_hms_opt(0, 0, 0)?;
            t.signed_duration_since(midnight)
        }
        (Time(x), Time(y)) => x.signed_duration_since(*y),
        _ => return None,
    };
    Some(delta.abs())
}
