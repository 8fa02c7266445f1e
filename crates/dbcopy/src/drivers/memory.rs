//! In-process store.
//!
//! `memory://name?dialect=access` gives an empty store that reports the given
//! dialect for hook dispatch (default: "memory"). It enforces the constraints
//! a real destination would (existing tables, known columns, NOT NULL,
//! primary key and unique index uniqueness) so failures surface the same way.
//!
//! Rows are kept in insertion order, which is the order pages and streams
//! return them in.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::TimeDelta;
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::filter::{Condition, RowFilter};
use crate::core::schema::{DefaultValue, IndexSpec, TableSchema};
use crate::core::traits::{DataStore, DdlStatement, ROW_CHANNEL_CAPACITY};
use crate::core::value::{Row, SqlValue};
use crate::error::{CopyError, Result};
use crate::verify::{temporal_delta, values_match};

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: TableSchema,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, MemoryTable>,
    ddl_log: Vec<DdlStatement>,
}

/// In-process [`DataStore`].
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    dialect: String,
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dialect: "memory".to_string(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Create a store from a `memory://name?dialect=...` URL.
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .split_once("://")
            .map(|(_, rest)| rest)
            .ok_or_else(|| CopyError::Config(format!("'{}' is not a memory:// URL", url)))?;
        let (name, query) = match rest.split_once('?') {
            Some((name, query)) => (name, Some(query)),
            None => (rest, None),
        };
        let name = name.trim_end_matches('/');
        let mut store = Self::new(if name.is_empty() { "memory" } else { name });

        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            match pair.split_once('=') {
                Some(("dialect", dialect)) if !dialect.is_empty() => {
                    store = store.with_dialect(dialect);
                }
                _ => {
                    return Err(CopyError::Config(format!(
                        "unsupported memory store option '{}'",
                        pair
                    )))
                }
            }
        }
        Ok(store)
    }

    /// Report `dialect` for hook dispatch.
    #[must_use]
    pub fn with_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.dialect = dialect.into();
        self
    }

    /// Builder form of [`MemoryStore::seed_table`].
    #[must_use]
    pub fn with_table(self, schema: TableSchema, rows: Vec<Row>) -> Self {
        self.seed_table(schema, rows);
        self
    }

    /// Create or replace a table with the given rows, bypassing constraint
    /// checks.
    pub fn seed_table(&self, schema: TableSchema, rows: Vec<Row>) {
        let mut state = self.lock();
        state
            .tables
            .insert(schema.name.clone(), MemoryTable { schema, rows });
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.lock().tables.contains_key(table)
    }

    /// Full definition of a table, including indexes created so far.
    pub fn schema(&self, table: &str) -> Option<TableSchema> {
        self.lock().tables.get(table).map(|t| t.schema.clone())
    }

    /// Snapshot of a table's rows; empty when the table does not exist.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Every DDL statement executed successfully, in order.
    pub fn executed_ddl(&self) -> Vec<DdlStatement> {
        self.lock().ddl_log.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn missing_table(table: &str) -> CopyError {
    CopyError::Store(format!("table {} does not exist", table))
}

impl MemoryState {
    fn table(&self, table: &str) -> Result<&MemoryTable> {
        self.tables.get(table).ok_or_else(|| missing_table(table))
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut MemoryTable> {
        self.tables.get_mut(table).ok_or_else(|| missing_table(table))
    }
}

impl MemoryTable {
    /// Conform `row` to the table: known columns only, defaults filled,
    /// NOT NULL and uniqueness enforced. Returns the row in column order.
    fn conform(&self, row: &Row) -> Result<Row> {
        if let Some(unknown) = row
            .columns()
            .find(|c| self.schema.get_column(c).is_none())
        {
            return Err(CopyError::Store(format!(
                "column {} of table {} does not exist",
                unknown, self.schema.name
            )));
        }

        let mut stored = Row::with_capacity(self.schema.columns.len());
        for column in &self.schema.columns {
            let value = match (row.get(&column.name), &column.default) {
                (Some(v), _) => v.clone(),
                (None, Some(DefaultValue::Literal(v))) => v.clone(),
                (None, _) => SqlValue::Null,
            };
            if value.is_null() && !column.is_nullable {
                return Err(CopyError::Store(format!(
                    "null value in column {} of table {} violates not-null constraint",
                    column.name, self.schema.name
                )));
            }
            stored.push(column.name.clone(), value);
        }

        if !self.schema.pk_columns().is_empty()
            && self.duplicates(&stored, self.schema.pk_columns())
        {
            return Err(CopyError::Store(format!(
                "duplicate key value violates primary key of table {}",
                self.schema.name
            )));
        }
        for index in self.schema.indexes.iter().filter(|i| i.unique) {
            if self.duplicates(&stored, &index.columns) {
                return Err(CopyError::Store(format!(
                    "duplicate key value violates unique index {}",
                    index.name
                )));
            }
        }
        Ok(stored)
    }

    fn duplicates(&self, candidate: &Row, key: &[String]) -> bool {
        self.rows.iter().any(|existing| {
            key.iter().all(|col| match (existing.get(col), candidate.get(col)) {
                (Some(a), Some(b)) => !a.is_null() && values_match(a, b),
                _ => false,
            })
        })
    }
}

fn row_matches(row: &Row, filter: &RowFilter) -> bool {
    let Ok(tolerance) = TimeDelta::from_std(filter.tolerance()) else {
        return false;
    };
    filter.conditions().iter().all(|condition| {
        let Some(have) = row.get(condition.column()) else {
            return false;
        };
        match condition {
            Condition::IsNull(_) => have.is_null(),
            Condition::Equals(_, want) => values_match(have, want),
            Condition::Within { value, .. } => {
                temporal_delta(have, value).is_some_and(|d| d <= tolerance)
            }
        }
    })
}

#[async_trait]
impl DataStore for MemoryStore {
    fn dialect(&self) -> &str {
        &self.dialect
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.lock().tables.keys().cloned().collect())
    }

    async fn introspect_schema(&self, table: &str) -> Result<TableSchema> {
        let mut schema = self.lock().table(table)?.schema.clone();
        schema.indexes.clear();
        Ok(schema)
    }

    async fn introspect_indexes(&self, table: &str) -> Result<Vec<IndexSpec>> {
        Ok(self.lock().table(table)?.schema.indexes.clone())
    }

    async fn count_rows(&self, table: &str) -> Result<u64> {
        Ok(self.lock().table(table)?.rows.len() as u64)
    }

    async fn fetch_rows(&self, table: &str, offset: u64, limit: usize) -> Result<Vec<Row>> {
        let state = self.lock();
        let rows = &state.table(table)?.rows;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(rows.len());
        let end = start.saturating_add(limit).min(rows.len());
        Ok(rows[start..end].to_vec())
    }

    fn stream_rows(&self, table: &str) -> mpsc::Receiver<Result<Row>> {
        let (tx, rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);
        let snapshot = self.lock().table(table).map(|t| t.rows.clone());

        tokio::spawn(async move {
            match snapshot {
                Ok(rows) => {
                    for row in rows {
                        if tx.send(Ok(row)).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                }
            }
        });
        rx
    }

    async fn find_row(&self, table: &str, filter: &RowFilter) -> Result<Option<Row>> {
        let state = self.lock();
        Ok(state
            .table(table)?
            .rows
            .iter()
            .find(|row| row_matches(row, filter))
            .cloned())
    }

    async fn execute_ddl(&self, ddl: &DdlStatement) -> Result<()> {
        let mut state = self.lock();
        match ddl {
            DdlStatement::CreateTable(schema) => {
                if state.tables.contains_key(&schema.name) {
                    return Err(CopyError::Store(format!(
                        "relation {} already exists",
                        schema.name
                    )));
                }
                schema.validate().map_err(CopyError::Store)?;
                let mut schema = schema.clone();
                schema.indexes.clear();
                state.tables.insert(
                    schema.name.clone(),
                    MemoryTable {
                        schema,
                        rows: Vec::new(),
                    },
                );
            }
            DdlStatement::CreateIndex { table, index } => {
                let target = state.table_mut(table)?;
                if let Some(col) = index
                    .columns
                    .iter()
                    .find(|c| target.schema.get_column(c).is_none())
                {
                    return Err(CopyError::Store(format!(
                        "column {} named in index {} does not exist",
                        col, index.name
                    )));
                }
                if target.schema.indexes.iter().any(|i| i.name == index.name) {
                    return Err(CopyError::Store(format!(
                        "index {} already exists",
                        index.name
                    )));
                }
                target.schema.indexes.push(index.clone());
            }
            DdlStatement::SessionSetting(sql) => {
                debug!("{}: session setting {}", self.name, sql);
            }
        }
        state.ddl_log.push(ddl.clone());
        Ok(())
    }

    async fn insert_row(&self, table: &str, row: &Row) -> Result<()> {
        let mut state = self.lock();
        let target = state.table_mut(table)?;
        let stored = target.conform(row)?;
        target.rows.push(stored);
        Ok(())
    }

    async fn disconnect(&self) {
        debug!("{}: disconnected", self.name);
    }
}
