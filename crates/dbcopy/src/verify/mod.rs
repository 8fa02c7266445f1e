//! Row-for-row verification of a finished copy.
//!
//! Every source row is streamed with the same paging policy as the data
//! copy, its counterpart is looked up in the destination, and the two are
//! compared column by column with [`compare_values`]. The first missing row
//! or mismatch ends the run.
//!
//! The destination lookup filters on every column of the source row.
//! Temporal columns match within the tolerance window rather than exactly,
//! so sub-second precision lost by the destination is tolerated while rows
//! that differ only by timestamp still find their own counterpart.

mod compare;

pub use compare::{compare_values, diff_rows, values_match, FieldDiff};
pub(crate) use compare::temporal_delta;

use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::config::PageSize;
use crate::core::filter::RowFilter;
use crate::core::traits::DataStore;
use crate::core::value::Row;
use crate::error::{CopyError, Result};
use crate::pipeline::RowReader;

/// A destination row that differs from its source row.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationDiff {
    pub table: String,
    pub source_row: Row,
    pub destination_row: Row,
    /// Column to (source value, destination value), for mismatching columns only.
    pub fields: FieldDiff,
}

impl fmt::Display for VerificationDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Verification failed for table {}: {} column(s) differ",
            self.table,
            self.fields.len()
        )?;
        writeln!(f, "  Source:      {}", self.source_row)?;
        writeln!(f, "  Destination: {}", self.destination_row)?;
        write!(f, "  Diff:")?;
        for (column, (src, dst)) in &self.fields {
            write!(f, "\n    {}: {} != {}", column, src, dst)?;
        }
        Ok(())
    }
}

/// Compares a copied table against its source.
#[derive(Debug, Clone)]
pub struct Verifier {
    page_size: PageSize,
    tolerance: Duration,
}

impl Verifier {
    pub fn new(page_size: PageSize, tolerance: Duration) -> Self {
        Self {
            page_size,
            tolerance,
        }
    }

    /// Verify every row of `table`. Returns the number of rows verified.
    pub async fn verify_table(
        &self,
        table: &str,
        source: &dyn DataStore,
        destination: &dyn DataStore,
    ) -> Result<u64> {
        let mut reader = RowReader::open(source, table, self.page_size).await?;
        let mut verified = 0u64;

        while let Some((row, _)) = reader.next_row().await? {
            self.verify_row(table, &row, destination).await?;
            verified += 1;
        }

        debug!("{}: verified {} rows", table, verified);
        Ok(verified)
    }

    /// Lookup for the destination counterpart of a source row.
    fn lookup_filter(&self, row: &Row) -> RowFilter {
        RowFilter::new(row.clone()).with_tolerance(self.tolerance)
    }

    /// Find the destination counterpart of one source row and compare them.
    pub async fn verify_row(
        &self,
        table: &str,
        source_row: &Row,
        destination: &dyn DataStore,
    ) -> Result<()> {
        let filter = self.lookup_filter(source_row);
        let destination_row = destination
            .find_row(table, &filter)
            .await?
            .ok_or_else(|| CopyError::missing_row(table, source_row))?;

        let fields = diff_rows(source_row, &destination_row, self.tolerance);
        if fields.is_empty() {
            return Ok(());
        }
        Err(CopyError::VerificationMismatch(Box::new(VerificationDiff {
            table: table.to_string(),
            source_row: source_row.clone(),
            destination_row,
            fields,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{ColumnSpec, ColumnType, TableSchema};
    use crate::core::value::SqlValue;
    use crate::drivers::memory::MemoryStore;
    use chrono::{NaiveDate, NaiveDateTime};

    const SECOND: Duration = Duration::from_secs(1);

    fn at(milli: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_milli_opt(12, 0, second, milli)
            .unwrap()
    }

    fn events() -> TableSchema {
        TableSchema::new("events")
            .column(ColumnSpec::new("id", ColumnType::Integer).primary_key())
            .column(ColumnSpec::new("kind", ColumnType::String { size: Some(20) }))
            .column(ColumnSpec::new("at", ColumnType::DateTime))
    }

    fn row(id: i32, kind: &str, at: NaiveDateTime) -> Row {
        Row::new().with("id", id).with("kind", kind).with("at", at)
    }

    fn verifier() -> Verifier {
        Verifier::new(PageSize::bounded(2).unwrap(), SECOND)
    }

    #[tokio::test]
    async fn test_identical_tables_verify() {
        let rows = vec![row(1, "a", at(0, 0)), row(2, "b", at(0, 1)), row(3, "c", at(0, 2))];
        let source = MemoryStore::new("src").with_table(events(), rows.clone());
        let destination = MemoryStore::new("dst").with_table(events(), rows);

        let n = verifier()
            .verify_table("events", &source, &destination)
            .await
            .unwrap();
        assert_eq!(n, 3);
    }

    #[tokio::test]
    async fn test_sub_second_loss_is_tolerated() {
        let source = MemoryStore::new("src").with_table(events(), vec![row(1, "a", at(400, 0))]);
        let destination = MemoryStore::new("dst").with_table(events(), vec![row(1, "a", at(0, 0))]);
        verifier()
            .verify_table("events", &source, &destination)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_time_difference_at_tolerance_is_mismatch() {
        let source = MemoryStore::new("src").with_table(events(), vec![row(1, "a", at(0, 0))]);
        let destination = MemoryStore::new("dst").with_table(events(), vec![row(1, "a", at(0, 1))]);
        let err = verifier()
            .verify_table("events", &source, &destination)
            .await
            .unwrap_err();

        assert!(err.is_verification());
        match err {
            CopyError::VerificationMismatch(diff) => {
                assert_eq!(diff.table, "events");
                assert_eq!(diff.fields.len(), 1);
                assert!(diff.fields.contains_key("at"));
                let text = diff.to_string();
                assert!(text.contains("Source:"));
                assert!(text.contains("at:"));
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_time_outside_window_is_missing_row() {
        let source = MemoryStore::new("src").with_table(events(), vec![row(1, "a", at(500, 0))]);
        let destination = MemoryStore::new("dst").with_table(events(), vec![row(1, "a", at(0, 2))]);
        let err = verifier()
            .verify_table("events", &source, &destination)
            .await
            .unwrap_err();
        assert!(matches!(err, CopyError::MissingRow { .. }));
    }

    #[tokio::test]
    async fn test_missing_row_names_table_and_row() {
        let source = MemoryStore::new("src").with_table(
            events(),
            vec![row(1, "a", at(0, 0)), row(2, "b", at(0, 0))],
        );
        let destination = MemoryStore::new("dst").with_table(events(), vec![row(1, "a", at(0, 0))]);
        let err = verifier()
            .verify_table("events", &source, &destination)
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, CopyError::MissingRow { .. }));
        assert!(msg.contains("events"));
        assert!(msg.contains("id: 2"));
    }

    #[tokio::test]
    async fn test_changed_value_is_missing_row() {
        let source = MemoryStore::new("src").with_table(events(), vec![row(1, "a", at(0, 0))]);
        let destination = MemoryStore::new("dst").with_table(events(), vec![row(1, "z", at(0, 0))]);
        let err = verifier()
            .verify_table("events", &source, &destination)
            .await
            .unwrap_err();
        assert!(matches!(err, CopyError::MissingRow { .. }));
    }

    #[tokio::test]
    async fn test_rows_differing_only_by_timestamp_verify() {
        let audit = TableSchema::new("audit")
            .column(ColumnSpec::new("kind", ColumnType::String { size: Some(20) }))
            .column(ColumnSpec::new("at", ColumnType::DateTime));
        let rows = vec![
            Row::new().with("kind", "login").with("at", at(0, 0)),
            Row::new().with("kind", "login").with("at", at(0, 30)),
        ];
        let source = MemoryStore::new("src").with_table(audit.clone(), rows.clone());
        let destination = MemoryStore::new("dst").with_table(audit, rows);

        let n = Verifier::new(PageSize::Unbounded, SECOND)
            .verify_table("audit", &source, &destination)
            .await
            .unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn test_lookup_filter_keeps_every_column() {
        let source_row = row(1, "a", at(0, 0)).with("note", SqlValue::Null);
        let filter = verifier().lookup_filter(&source_row);
        let columns: Vec<_> = filter
            .conditions()
            .iter()
            .map(|c| c.column().to_string())
            .collect();
        assert_eq!(columns, vec!["id", "kind", "at", "note"]);
        assert_eq!(filter.tolerance(), SECOND);
    }
}
