//! Row lookup filters.
//!
//! A [`RowFilter`] matches rows equal to a reference row. With a tolerance
//! set, temporal columns match any value inside a window around the
//! reference value instead, so a row whose timestamps lost precision in the
//! destination is still found, and two rows that differ only by timestamp
//! are still told apart.

use std::time::Duration;

use chrono::{NaiveTime, TimeDelta};

use super::value::{Row, SqlValue};

/// One predicate of a [`RowFilter`].
#[derive(Debug, Clone, PartialEq)]
pub enum Condition<'a> {
    /// `column IS NULL`.
    IsNull(&'a str),
    /// `column = value`.
    Equals(&'a str, &'a SqlValue),
    /// `column >= low AND column <= high`, centred on `value`.
    Within {
        column: &'a str,
        value: &'a SqlValue,
        low: SqlValue,
        high: SqlValue,
    },
}

impl Condition<'_> {
    pub fn column(&self) -> &str {
        match self {
            Condition::IsNull(column) | Condition::Equals(column, _) => *column,
            Condition::Within { column, .. } => *column,
        }
    }
}

/// Conjunction of per-column predicates built from a row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFilter {
    row: Row,
    tolerance: Duration,
}

impl RowFilter {
    /// Exact match on every column of `row`.
    pub fn new(row: Row) -> Self {
        Self {
            row,
            tolerance: Duration::ZERO,
        }
    }

    /// Temporal columns match within `tolerance` of the row's value.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn row(&self) -> &Row {
        &self.row
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Predicates in column order.
    pub fn conditions(&self) -> Vec<Condition<'_>> {
        self.row
            .iter()
            .map(|(column, value)| {
                if value.is_null() {
                    return Condition::IsNull(column);
                }
                match temporal_window(value, self.tolerance) {
                    Some((low, high)) => Condition::Within {
                        column,
                        value,
                        low,
                        high,
                    },
                    None => Condition::Equals(column, value),
                }
            })
            .collect()
    }

    /// Values bound by the conditions, in placeholder order.
    pub fn bound_values(&self) -> Vec<SqlValue> {
        let mut values = Vec::with_capacity(self.row.len());
        for condition in self.conditions() {
            match condition {
                Condition::IsNull(_) => {}
                Condition::Equals(_, value) => values.push(value.clone()),
                Condition::Within { low, high, .. } => {
                    values.push(low);
                    values.push(high);
                }
            }
        }
        values
    }
}

impl From<Row> for RowFilter {
    fn from(row: Row) -> Self {
        Self::new(row)
    }
}

/// Inclusive bounds around a time-of-day or timestamp. Dates have no
/// sub-day window and fall back to equality, as does a zero tolerance.
fn temporal_window(value: &SqlValue, tolerance: Duration) -> Option<(SqlValue, SqlValue)> {
    if tolerance.is_zero() {
        return None;
    }
    let delta = TimeDelta::from_std(tolerance).ok()?;

    match value {
        SqlValue::DateTime(v) => Some((
            SqlValue::DateTime(v.checked_sub_signed(delta)?),
            SqlValue::DateTime(v.checked_add_signed(delta)?),
        )),
        SqlValue::DateTimeOffset(v) => Some((
            SqlValue::DateTimeOffset(v.checked_sub_signed(delta)?),
            SqlValue::DateTimeOffset(v.checked_add_signed(delta)?),
        )),
        SqlValue::Time(v) => {
            // clamp at midnight instead of wrapping into the other end of the day
            let (low, low_wrap) = v.overflowing_sub_signed(delta);
            let (high, high_wrap) = v.overflowing_add_signed(delta);
            let low = if low_wrap == 0 {
                low
            } else {
                NaiveTime::from_hms_opt(0, 0, 0)?
            };
            let high = if high_wrap == 0 {
                high
            } else {
                NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)?
            };
            Some((SqlValue::Time(low), SqlValue::Time(high)))
        }
        _ => None,
    }
}
