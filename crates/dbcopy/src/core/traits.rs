//! The store contract the copy engine is written against.
//!
//! - [`DataStore`]: everything the pipeline needs from a source or destination
//! - [`DdlStatement`]: structured DDL handed to a store for rendering
//!
//! Stores own their SQL rendering; the engine never builds SQL text itself.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

use super::schema::{IndexSpec, TableSchema};
use super::filter::RowFilter;
use super::value::Row;

/// Channel depth for streamed rows. Bounds memory for unbounded copies.
pub const ROW_CHANNEL_CAPACITY: usize = 1024;

/// Which side of the copy a store or table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreRole {
    Source,
    Destination,
}

impl fmt::Display for StoreRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreRole::Source => write!(f, "source"),
            StoreRole::Destination => write!(f, "destination"),
        }
    }
}

/// A table name tagged with the store it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub name: String,
    pub role: StoreRole,
}

impl TableRef {
    pub fn source(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: StoreRole::Source,
        }
    }

    pub fn destination(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: StoreRole::Destination,
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.role, self.name)
    }
}

/// A DDL operation, rendered to SQL by the store that executes it.
#[derive(Debug, Clone, PartialEq)]
pub enum DdlStatement {
    /// Create a table with its columns and primary key. Secondary indexes
    /// are not part of this statement.
    CreateTable(TableSchema),

    /// Create one secondary index.
    CreateIndex { table: String, index: IndexSpec },

    /// A session-level setting (e.g. `SET sql_mode = ...`). Pooled stores
    /// must apply it to every connection they hand out afterwards.
    SessionSetting(String),
}

impl DdlStatement {
    /// Table the statement applies to, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            DdlStatement::CreateTable(schema) => Some(&schema.name),
            DdlStatement::CreateIndex { table, .. } => Some(table),
            DdlStatement::SessionSetting(_) => None,
        }
    }
}

/// A source or destination database.
///
/// Implementations are shared across concurrent table workers, so every
/// method takes `&self`.
///
/// # Streaming
///
/// [`DataStore::stream_rows`] returns a channel receiver fed by a background
/// task, giving a lazy single pass over a table without loading it.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Dialect identifier used for hook dispatch (e.g. "postgres", "mysql").
    fn dialect(&self) -> &str;

    /// Run a trivial query to prove the store is reachable.
    async fn test_connection(&self) -> Result<()>;

    /// Base tables, ordered by name.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Columns, types, nullability, defaults and primary key of a table.
    /// Secondary indexes are left empty.
    async fn introspect_schema(&self, table: &str) -> Result<TableSchema>;

    /// Secondary indexes of a table (primary key excluded).
    async fn introspect_indexes(&self, table: &str) -> Result<Vec<IndexSpec>>;

    /// Exact row count.
    async fn count_rows(&self, table: &str) -> Result<u64>;

    /// One page of rows in a stable order (primary key when there is one).
    async fn fetch_rows(&self, table: &str, offset: u64, limit: usize) -> Result<Vec<Row>>;

    /// Stream every row of a table in a single pass.
    fn stream_rows(&self, table: &str) -> mpsc::Receiver<Result<Row>>;

    /// First row satisfying every condition of the filter. NULL matches
    /// NULL; temporal columns match within the filter's tolerance.
    async fn find_row(&self, table: &str, filter: &RowFilter) -> Result<Option<Row>>;

    /// Execute a DDL operation.
    async fn execute_ddl(&self, ddl: &DdlStatement) -> Result<()>;

    /// Insert one row.
    async fn insert_row(&self, table: &str, row: &Row) -> Result<()>;

    /// Close connections. The store must not be used afterwards.
    async fn disconnect(&self);
}
