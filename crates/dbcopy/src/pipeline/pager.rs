//! Table pagination.
//!
//! Two policies, selected by [`PageSize`]:
//!
//! - **Unbounded**: one streaming pass over the table via
//!   [`DataStore::stream_rows`].
//! - **Bounded(n)**: the row count is captured once when the table starts,
//!   then pages of up to `n` rows are fetched at an offset that advances by
//!   the number of rows each page actually returned, until the offset
//!   reaches the captured count.
//!
//! Rows inserted into the source after the count was captured may or may
//! not be read. A page that comes back empty before the count is reached means
//! the table changed underneath the copy and raises [`CopyError::Drift`].

use std::num::NonZeroUsize;

use tokio::sync::mpsc;
use tracing::debug;

use crate::config::PageSize;
use crate::core::traits::DataStore;
use crate::core::value::Row;
use crate::error::{CopyError, Result};

/// Where a row sits in a bounded copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowPosition {
    /// Index within its page, from 0.
    pub index: usize,
    /// Offset the page was fetched at.
    pub offset: u64,
}

/// Offset bookkeeping for a bounded copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    offset: u64,
    page_size: NonZeroUsize,
    total: u64,
}

impl PageCursor {
    pub fn new(page_size: NonZeroUsize, total: u64) -> Self {
        Self {
            offset: 0,
            page_size,
            total,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn page_size(&self) -> usize {
        self.page_size.get()
    }

    /// Row count captured when the table started.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_complete(&self) -> bool {
        self.offset >= self.total
    }

    /// Advance past a page that returned `returned` rows.
    pub fn advance(&mut self, returned: usize, table: &str) -> Result<()> {
        if returned == 0 && !self.is_complete() {
            return Err(CopyError::drift(table, self.offset, self.total));
        }
        self.offset += returned as u64;
        Ok(())
    }
}

enum Source {
    Stream(mpsc::Receiver<Result<Row>>),
    Paged {
        cursor: PageCursor,
        page: std::vec::IntoIter<Row>,
        page_offset: u64,
        index: usize,
    },
}

/// Reads every row of one table under either paging policy.
///
/// Shared by the data copy and the verifier so both see rows the same way.
pub struct RowReader<'a> {
    store: &'a dyn DataStore,
    table: String,
    source: Source,
}

impl<'a> RowReader<'a> {
    /// Start reading `table`. Bounded readers capture the row count here.
    pub async fn open(
        store: &'a dyn DataStore,
        table: &str,
        page_size: PageSize,
    ) -> Result<Self> {
        let source = match page_size {
            PageSize::Unbounded => Source::Stream(store.stream_rows(table)),
            PageSize::Bounded(n) => {
                let total = store.count_rows(table).await?;
                debug!("{}: {} rows to read in pages of {}", table, total, n);
                Source::Paged {
                    cursor: PageCursor::new(n, total),
                    page: Vec::new().into_iter(),
                    page_offset: 0,
                    index: 0,
                }
            }
        };
        Ok(Self {
            store,
            table: table.to_string(),
            source,
        })
    }

    /// Row count captured at open, for bounded readers.
    pub fn total(&self) -> Option<u64> {
        match &self.source {
            Source::Stream(_) => None,
            Source::Paged { cursor, .. } => Some(cursor.total()),
        }
    }

    /// Next row, with its page position for bounded readers. `None` once the
    /// table is exhausted.
    pub async fn next_row(&mut self) -> Result<Option<(Row, Option<RowPosition>)>> {
        match &mut self.source {
            Source::Stream(rx) => match rx.recv().await {
                Some(row) => Ok(Some((row?, None))),
                None => Ok(None),
            },
            Source::Paged {
                cursor,
                page,
                page_offset,
                index,
            } => loop {
                if let Some(row) = page.next() {
                    let position = RowPosition {
                        index: *index,
                        offset: *page_offset,
                    };
                    *index += 1;
                    return Ok(Some((row, Some(position))));
                }
                if cursor.is_complete() {
                    return Ok(None);
                }

                let rows = self
                    .store
                    .fetch_rows(&self.table, cursor.offset(), cursor.page_size())
                    .await?;
                debug!(
                    "{}: page at offset {} returned {} rows",
                    self.table,
                    cursor.offset(),
                    rows.len()
                );
                *page_offset = cursor.offset();
                cursor.advance(rows.len(), &self.table)?;
                *page = rows.into_iter();
                *index = 0;
            },
        }
    }
}
