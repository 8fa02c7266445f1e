//! The copy pipeline.
//!
//! A run moves through four phases in a fixed order, each finishing for
//! every table before the next begins:
//!
//! 1. **Schema**: translate and create every table (no secondary indexes)
//! 2. **Data**: copy every row, page by page or in one stream
//! 3. **Indexes**: create secondary indexes once the data is in place
//! 4. **Verify** (optional): re-read the source and match every row
//!
//! Within a phase, up to `workers` tables run concurrently. Hooks for one
//! table always fire in order. The first error aborts the run and leaves
//! the destination as it is.

mod pager;
mod progress;

pub use pager::{PageCursor, RowPosition, RowReader};
pub use progress::{
    JsonProgress, LogProgress, NoProgress, Phase, PhaseGuard, ProgressReporter, ProgressUpdate,
};

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{CopyConfig, PageSize, DEFAULT_TEMPORAL_TOLERANCE_MS};
use crate::core::traits::{DataStore, DdlStatement};
use crate::core::value::Row;
use crate::error::{CopyError, Result};
use crate::hooks::{Event, HookArgs, HookContext, HookRegistry, Stage};
use crate::translate::SchemaTranslator;
use crate::verify::Verifier;

/// One copy run's parameters. Immutable once built.
#[derive(Clone)]
pub struct CopyJob {
    source: Arc<dyn DataStore>,
    destination: Arc<dyn DataStore>,
    page_size: PageSize,
    exclude: HashSet<String>,
    verify: bool,
    workers: usize,
    temporal_tolerance: Duration,
}

impl CopyJob {
    /// A job with default settings: pages of 1000, no exclusions, no
    /// verification, one table at a time.
    pub fn new(source: Arc<dyn DataStore>, destination: Arc<dyn DataStore>) -> Self {
        Self {
            source,
            destination,
            page_size: PageSize::default(),
            exclude: HashSet::new(),
            verify: false,
            workers: 1,
            temporal_tolerance: Duration::from_millis(DEFAULT_TEMPORAL_TOLERANCE_MS),
        }
    }

    /// A job configured from the `copy` section of a config file.
    pub fn from_config(
        config: &CopyConfig,
        source: Arc<dyn DataStore>,
        destination: Arc<dyn DataStore>,
    ) -> Self {
        Self::new(source, destination)
            .with_page_size(config.page_size)
            .with_exclude(config.exclude_tables.iter().cloned())
            .with_verify(config.verify)
            .with_workers(config.get_workers())
            .with_temporal_tolerance(config.get_temporal_tolerance())
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: PageSize) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn with_exclude<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(tables.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Tables processed concurrently within a phase. Zero is treated as one.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    #[must_use]
    pub fn with_temporal_tolerance(mut self, tolerance: Duration) -> Self {
        self.temporal_tolerance = tolerance;
        self
    }

    pub fn source(&self) -> &dyn DataStore {
        self.source.as_ref()
    }

    pub fn destination(&self) -> &dyn DataStore {
        self.destination.as_ref()
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn verify(&self) -> bool {
        self.verify
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn temporal_tolerance(&self) -> Duration {
        self.temporal_tolerance
    }

    /// Exact-name exclusion check, applied by every phase.
    pub fn is_excluded(&self, table: &str) -> bool {
        self.exclude.contains(table)
    }
}

impl fmt::Debug for CopyJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyJob")
            .field("source", &self.source.dialect())
            .field("destination", &self.destination.dialect())
            .field("page_size", &self.page_size)
            .field("exclude", &self.exclude)
            .field("verify", &self.verify)
            .field("workers", &self.workers)
            .field("temporal_tolerance", &self.temporal_tolerance)
            .finish()
    }
}

/// Size of the source, reported before copying starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub tables: usize,
    pub records: u64,
}

impl fmt::Display for SourceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tables, {} records",
            self.tables,
            group_thousands(self.records)
        )
    }
}

/// `1234567` as `1,234,567`.
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Source size before the copy.
    pub summary: SourceSummary,

    /// Tables in the source.
    pub tables_total: usize,

    /// Tables created and copied.
    pub tables_copied: usize,

    /// Source tables skipped by the exclusion list.
    pub tables_excluded: usize,

    /// Rows inserted into the destination.
    pub rows_copied: u64,

    /// Secondary indexes created.
    pub indexes_created: u64,

    /// Whether the verify phase ran.
    pub verified: bool,

    /// Rows matched during verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_verified: Option<u64>,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl CopyReport {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs a [`CopyJob`] with a hook registry.
pub struct CopyPipeline {
    job: CopyJob,
    hooks: HookRegistry,
    progress: Box<dyn ProgressReporter>,
}

impl CopyPipeline {
    pub fn new(job: CopyJob, hooks: HookRegistry) -> Self {
        Self {
            job,
            hooks,
            progress: Box::new(LogProgress),
        }
    }

    /// Replace the default (`tracing`) progress reporter.
    #[must_use]
    pub fn with_progress(mut self, reporter: impl ProgressReporter + 'static) -> Self {
        self.progress = Box::new(reporter);
        self
    }

    pub fn job(&self) -> &CopyJob {
        &self.job
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Count the source's tables and rows.
    pub async fn summarize(&self, tables: &[String]) -> Result<SourceSummary> {
        let mut records = 0u64;
        for table in tables {
            records += self.job.source().count_rows(table).await?;
        }
        Ok(SourceSummary {
            tables: tables.len(),
            records,
        })
    }

    /// Run every phase.
    pub async fn run(&self) -> Result<CopyReport> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!("Starting copy run {}", run_id);
        debug!("{:?}", self.job);

        let tables = self.job.source().list_tables().await?;
        let summary = self.summarize(&tables).await?;
        info!("{}", summary);

        let eligible: Vec<&str> = tables
            .iter()
            .map(String::as_str)
            .filter(|t| !self.job.is_excluded(t))
            .collect();
        let excluded = tables.len() - eligible.len();
        if excluded > 0 {
            info!("Excluding {} tables", excluded);
        }

        self.copy_schema(&tables).await?;
        let rows_copied = self.copy_data(&tables).await?;
        let indexes_created = self.copy_indexes(&tables).await?;
        let rows_verified = if self.job.verify() {
            Some(self.verify_data(&tables).await?)
        } else {
            None
        };

        let completed_at = Utc::now();
        let report = CopyReport {
            run_id,
            summary,
            tables_total: tables.len(),
            tables_copied: eligible.len(),
            tables_excluded: excluded,
            rows_copied,
            indexes_created,
            verified: rows_verified.is_some(),
            rows_verified,
            started_at,
            completed_at,
            duration_seconds: timer.elapsed().as_secs_f64(),
        };
        info!(
            "Copy completed: {} tables, {} rows in {:.1}s",
            report.tables_copied, report.rows_copied, report.duration_seconds
        );
        Ok(report)
    }

    fn eligible<'t>(&self, tables: &'t [String]) -> Vec<&'t str> {
        tables
            .iter()
            .map(String::as_str)
            .filter(|t| !self.job.is_excluded(t))
            .collect()
    }

    async fn dispatch_phase(&self, stage: Stage) -> Result<()> {
        let mut ctx = HookContext::new(
            self.job.source(),
            self.job.destination(),
            HookArgs::Phase,
        );
        self.hooks.dispatch(stage, &mut ctx).await
    }

    async fn copy_schema(&self, tables: &[String]) -> Result<()> {
        self.dispatch_phase(Stage::before(Event::CopySchema)).await?;

        let eligible = self.eligible(tables);
        let guard = PhaseGuard::start(Phase::Schema, eligible.len(), self.progress.as_ref());
        let translator = SchemaTranslator::new(&self.hooks);

        let mut tasks = stream::iter(eligible)
            .map(|table| self.create_table(table, &translator, &guard))
            .buffer_unordered(self.job.workers());
        while let Some(result) = tasks.next().await {
            result?;
        }
        drop(tasks);
        guard.complete();
        drop(guard);

        self.dispatch_phase(Stage::after(Event::CopySchema)).await
    }

    async fn create_table(
        &self,
        table: &str,
        translator: &SchemaTranslator<'_>,
        guard: &PhaseGuard<'_>,
    ) -> Result<()> {
        let source = self.job.source();
        let destination = self.job.destination();

        let mut schema = translator.translate(table, source, destination).await?;
        destination
            .execute_ddl(&DdlStatement::CreateTable(schema.clone()))
            .await
            .map_err(|e| CopyError::ddl(table, e))?;
        info!("{}: created ({} columns)", table, schema.columns.len());

        let mut ctx = HookContext::new(
            source,
            destination,
            HookArgs::Table {
                table,
                schema: &mut schema,
            },
        );
        self.hooks
            .dispatch(Stage::after(Event::CreateTable), &mut ctx)
            .await?;

        guard.table_done(table, 1);
        Ok(())
    }

    async fn copy_data(&self, tables: &[String]) -> Result<u64> {
        self.dispatch_phase(Stage::before(Event::CopyData)).await?;

        let eligible = self.eligible(tables);
        let guard = PhaseGuard::start(Phase::Data, eligible.len(), self.progress.as_ref());

        let mut tasks = stream::iter(eligible)
            .map(|table| self.copy_table(table, &guard))
            .buffer_unordered(self.job.workers());
        while let Some(result) = tasks.next().await {
            result?;
        }
        drop(tasks);
        guard.complete();
        let rows = guard.items();
        drop(guard);

        self.dispatch_phase(Stage::after(Event::CopyData)).await?;
        Ok(rows)
    }

    async fn copy_table(&self, table: &str, guard: &PhaseGuard<'_>) -> Result<()> {
        let source = self.job.source();
        let destination = self.job.destination();
        let row_hooks = self.hooks.handles(Event::CopyRow);

        let mut reader = RowReader::open(source, table, self.job.page_size()).await?;
        let mut copied = 0u64;

        while let Some((mut row, position)) = reader.next_row().await? {
            if row_hooks {
                self.dispatch_row(Stage::before(Event::CopyRow), table, &mut row, position)
                    .await?;
            }
            destination
                .insert_row(table, &row)
                .await
                .map_err(|e| CopyError::row_insert(table, &row, e))?;
            if row_hooks {
                self.dispatch_row(Stage::after(Event::CopyRow), table, &mut row, position)
                    .await?;
            }
            copied += 1;
        }

        info!("{}: copied {} rows", table, copied);
        guard.table_done(table, copied);
        Ok(())
    }

    async fn dispatch_row(
        &self,
        stage: Stage,
        table: &str,
        row: &mut Row,
        position: Option<RowPosition>,
    ) -> Result<()> {
        let mut ctx = HookContext::new(
            self.job.source(),
            self.job.destination(),
            HookArgs::Row {
                table,
                row,
                position,
            },
        );
        self.hooks.dispatch(stage, &mut ctx).await
    }

    async fn copy_indexes(&self, tables: &[String]) -> Result<u64> {
        self.dispatch_phase(Stage::before(Event::CopyIndexes)).await?;

        let eligible = self.eligible(tables);
        let guard = PhaseGuard::start(Phase::Indexes, eligible.len(), self.progress.as_ref());

        let mut tasks = stream::iter(eligible)
            .map(|table| self.add_indexes(table, &guard))
            .buffer_unordered(self.job.workers());
        while let Some(result) = tasks.next().await {
            result?;
        }
        drop(tasks);
        guard.complete();
        let created = guard.items();
        drop(guard);

        self.dispatch_phase(Stage::after(Event::CopyIndexes)).await?;
        Ok(created)
    }

    async fn add_indexes(&self, table: &str, guard: &PhaseGuard<'_>) -> Result<()> {
        let source = self.job.source();
        let destination = self.job.destination();

        let mut indexes = source.introspect_indexes(table).await?;

        let mut ctx = HookContext::new(
            source,
            destination,
            HookArgs::Indexes {
                table,
                indexes: &mut indexes,
            },
        );
        self.hooks
            .dispatch(Stage::before(Event::AddIndexes), &mut ctx)
            .await?;

        for index in &indexes {
            destination
                .execute_ddl(&DdlStatement::CreateIndex {
                    table: table.to_string(),
                    index: index.clone(),
                })
                .await
                .map_err(|e| CopyError::ddl(table, e))?;
            debug!("{}: created index {}", table, index.name);
        }

        let mut ctx = HookContext::new(
            source,
            destination,
            HookArgs::Indexes {
                table,
                indexes: &mut indexes,
            },
        );
        self.hooks
            .dispatch(Stage::after(Event::AddIndexes), &mut ctx)
            .await?;

        guard.table_done(table, indexes.len() as u64);
        Ok(())
    }

    async fn verify_data(&self, tables: &[String]) -> Result<u64> {
        let eligible = self.eligible(tables);
        let guard = PhaseGuard::start(Phase::Verify, eligible.len(), self.progress.as_ref());
        let verifier = Verifier::new(self.job.page_size(), self.job.temporal_tolerance());

        let mut tasks = stream::iter(eligible)
            .map(|table| {
                let verifier = &verifier;
                let guard = &guard;
                async move {
                    let rows = verifier
                        .verify_table(table, self.job.source(), self.job.destination())
                        .await?;
                    guard.table_done(table, rows);
                    Ok::<_, CopyError>(())
                }
            })
            .buffer_unordered(self.job.workers());
        while let Some(result) = tasks.next().await {
            result?;
        }
        drop(tasks);
        guard.complete();
        Ok(guard.items())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{ColumnSpec, ColumnType, IndexSpec, TableSchema};
    use crate::core::value::SqlValue;
    use crate::drivers::memory::MemoryStore;
    use crate::hooks::{DialectFilter, HookRole};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    fn accounts_schema() -> TableSchema {
        TableSchema::new("accounts")
            .column(ColumnSpec::new("id", ColumnType::Integer).primary_key())
            .column(ColumnSpec::new("name", ColumnType::String { size: Some(50) }))
            .column(ColumnSpec::new(
                "balance",
                ColumnType::Decimal {
                    precision: 10,
                    scale: 2,
                },
            ))
            .column(ColumnSpec::new("created_at", ColumnType::DateTime))
            .index(IndexSpec::new("ix_accounts_name", vec!["name".into()], false))
    }

    fn account(id: i32) -> Row {
        let created = NaiveDate::from_ymd_opt(2023, 6, 1)
            .unwrap()
            .and_hms_milli_opt(8, id as u32, 0, 250)
            .unwrap();
        Row::new()
            .with("id", id)
            .with("name", format!("account {}", id))
            .with("balance", Decimal::new(i64::from(id) * 1050, 2))
            .with("created_at", created)
    }

    fn logs_schema() -> TableSchema {
        TableSchema::new("logs")
            .column(ColumnSpec::new("id", ColumnType::BigInt).primary_key())
            .column(ColumnSpec::new("message", ColumnType::Text))
    }

    fn source() -> Arc<MemoryStore> {
        let store = MemoryStore::new("legacy")
            .with_table(accounts_schema(), (1..=5).map(account).collect())
            .with_table(
                logs_schema(),
                vec![Row::new().with("id", 1i64).with("message", "boot")],
            );
        Arc::new(store)
    }

    fn job(source: &Arc<MemoryStore>, destination: &Arc<MemoryStore>) -> CopyJob {
        CopyJob::new(source.clone(), destination.clone())
    }

    #[tokio::test]
    async fn test_end_to_end_copy_with_exclusion_and_verify() {
        let src = source();
        let dst = Arc::new(MemoryStore::new("warehouse"));
        let job = job(&src, &dst)
            .with_page_size(PageSize::bounded(2).unwrap())
            .with_exclude(["logs"])
            .with_verify(true);

        let report = CopyPipeline::new(job, HookRegistry::with_builtins())
            .with_progress(NoProgress)
            .run()
            .await
            .unwrap();

        assert_eq!(dst.rows("accounts").len(), 5);
        assert!(!dst.has_table("logs"));
        assert_eq!(
            dst.schema("accounts").unwrap().indexes,
            vec![IndexSpec::new("ix_accounts_name", vec!["name".into()], false)]
        );

        assert_eq!(report.summary, SourceSummary { tables: 2, records: 6 });
        assert_eq!(report.tables_total, 2);
        assert_eq!(report.tables_copied, 1);
        assert_eq!(report.tables_excluded, 1);
        assert_eq!(report.rows_copied, 5);
        assert_eq!(report.indexes_created, 1);
        assert!(report.verified);
        assert_eq!(report.rows_verified, Some(5));
    }

    #[tokio::test]
    async fn test_unbounded_copy() {
        let src = source();
        let dst = Arc::new(MemoryStore::new("warehouse"));
        let job = job(&src, &dst)
            .with_page_size(PageSize::Unbounded)
            .with_verify(true);

        let report = CopyPipeline::new(job, HookRegistry::new())
            .with_progress(NoProgress)
            .run()
            .await
            .unwrap();
        assert_eq!(report.rows_copied, 6);
        assert_eq!(dst.rows("logs").len(), 1);
    }

    type EventLog = Arc<Mutex<Vec<String>>>;

    fn record_everything(log: &EventLog) -> HookRegistry {
        let mut hooks = HookRegistry::new();
        let events = [
            Event::CopySchema,
            Event::CreateTable,
            Event::CopyData,
            Event::CopyRow,
            Event::CopyIndexes,
            Event::AddIndexes,
        ];
        for event in events {
            for stage in [Stage::before(event), Stage::after(event)] {
                let log = log.clone();
                hooks.register(crate::hooks::FnHook::new(
                    format!("record {}", stage),
                    stage,
                    HookRole::Both,
                    DialectFilter::Any,
                    move |ctx| {
                        let entry = match ctx.args.table() {
                            Some(table) => format!("{} {}", stage, table),
                            None => stage.to_string(),
                        };
                        log.lock().unwrap().push(entry);
                        Ok(())
                    },
                ));
            }
        }
        hooks
    }

    #[tokio::test]
    async fn test_excluded_table_never_reaches_any_phase() {
        let src = source();
        let dst = Arc::new(MemoryStore::new("warehouse"));
        let log = EventLog::default();
        let job = job(&src, &dst).with_exclude(["logs"]).with_verify(true);

        CopyPipeline::new(job, record_everything(&log))
            .with_progress(NoProgress)
            .run()
            .await
            .unwrap();

        let log = log.lock().unwrap();
        assert!(log.iter().all(|entry| !entry.contains("logs")));
        assert!(dst
            .executed_ddl()
            .iter()
            .all(|ddl| ddl.table() != Some("logs")));
    }

    #[tokio::test]
    async fn test_hook_order_across_phases() {
        let src = Arc::new(MemoryStore::new("legacy").with_table(
            accounts_schema(),
            (1..=2).map(account).collect(),
        ));
        let dst = Arc::new(MemoryStore::new("warehouse"));
        let log = EventLog::default();

        CopyPipeline::new(job(&src, &dst), record_everything(&log))
            .with_progress(NoProgress)
            .run()
            .await
            .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec![
                "before copy_schema",
                "before create_table accounts",
                "after create_table accounts",
                "after copy_schema",
                "before copy_data",
                "before copy_row accounts",
                "after copy_row accounts",
                "before copy_row accounts",
                "after copy_row accounts",
                "after copy_data",
                "before copy_indexes",
                "before add_indexes accounts",
                "after add_indexes accounts",
                "after copy_indexes",
            ]
        );
    }

    #[tokio::test]
    async fn test_row_hooks_see_page_positions_and_can_rewrite_rows() {
        let src = Arc::new(MemoryStore::new("legacy").with_table(
            accounts_schema(),
            (1..=3).map(account).collect(),
        ));
        let dst = Arc::new(MemoryStore::new("warehouse"));
        let positions = Arc::new(Mutex::new(Vec::new()));

        let mut hooks = HookRegistry::new();
        let seen = positions.clone();
        hooks.before(
            "shout",
            Event::CopyRow,
            HookRole::Source,
            DialectFilter::Any,
            move |ctx| {
                if let HookArgs::Row { row, position, .. } = &mut ctx.args {
                    seen.lock().unwrap().push(position.map(|p| (p.offset, p.index)));
                    if let Some(SqlValue::Text(name)) = row.get_mut("name") {
                        *name = name.to_uppercase();
                    }
                }
                Ok(())
            },
        );

        let job = job(&src, &dst).with_page_size(PageSize::bounded(2).unwrap());
        CopyPipeline::new(job, hooks)
            .with_progress(NoProgress)
            .run()
            .await
            .unwrap();

        assert_eq!(
            *positions.lock().unwrap(),
            vec![Some((0, 0)), Some((0, 1)), Some((2, 0))]
        );
        assert_eq!(
            dst.rows("accounts")[0].get("name"),
            Some(&SqlValue::Text("ACCOUNT 1".into()))
        );
    }

    #[tokio::test]
    async fn test_existing_destination_table_is_ddl_error() {
        let src = source();
        let dst = Arc::new(MemoryStore::new("warehouse").with_table(accounts_schema(), vec![]));

        let err = CopyPipeline::new(job(&src, &dst), HookRegistry::new())
            .with_progress(NoProgress)
            .run()
            .await
            .unwrap_err();
        match err {
            CopyError::DdlExecution { table, message } => {
                assert_eq!(table, "accounts");
                assert!(message.contains("already exists"));
            }
            other => panic!("expected DDL error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_row_aborts_with_row_in_error() {
        let strict = TableSchema::new("people")
            .column(ColumnSpec::new("id", ColumnType::Integer).primary_key())
            .column(ColumnSpec::new("name", ColumnType::Text).not_null());
        // Seeding bypasses constraints, so the source can hold a row the
        // destination will refuse
        let src = Arc::new(MemoryStore::new("legacy").with_table(
            strict,
            vec![
                Row::new().with("id", 1).with("name", "ok"),
                Row::new().with("id", 2).with("name", SqlValue::Null),
            ],
        ));
        let dst = Arc::new(MemoryStore::new("warehouse"));

        let err = CopyPipeline::new(job(&src, &dst), HookRegistry::new())
            .with_progress(NoProgress)
            .run()
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, CopyError::RowInsert { .. }));
        assert!(msg.contains("people"));
        assert!(msg.contains("id: 2"));
        // No rollback
        assert_eq!(dst.rows("people").len(), 1);
    }

    #[tokio::test]
    async fn test_parallel_workers_copy_every_table() {
        let src = MemoryStore::new("legacy");
        for i in 0..6 {
            let schema = TableSchema::new(format!("t{}", i))
                .column(ColumnSpec::new("id", ColumnType::Integer).primary_key());
            src.seed_table(schema, (0..10).map(|n| Row::new().with("id", n)).collect());
        }
        let src = Arc::new(src);
        let dst = Arc::new(MemoryStore::new("warehouse"));

        let job = job(&src, &dst)
            .with_workers(3)
            .with_page_size(PageSize::bounded(3).unwrap())
            .with_verify(true);
        let report = CopyPipeline::new(job, HookRegistry::with_builtins())
            .with_progress(NoProgress)
            .run()
            .await
            .unwrap();

        assert_eq!(report.tables_copied, 6);
        assert_eq!(report.rows_copied, 60);
        assert_eq!(report.rows_verified, Some(60));
        for i in 0..6 {
            assert_eq!(dst.rows(&format!("t{}", i)).len(), 10);
        }
    }

    #[tokio::test]
    async fn test_access_source_corrections_flow_into_destination() {
        let species = TableSchema::new("species")
            .column(ColumnSpec::new("code", ColumnType::String { size: Some(12) }).primary_key())
            .column(ColumnSpec::new(
                "weight",
                ColumnType::Decimal {
                    precision: 8,
                    scale: 2,
                },
            ));
        let src = Arc::new(
            MemoryStore::new("access")
                .with_dialect("msaccess")
                .with_table(
                    species,
                    vec![Row::new()
                        .with("code", "SAL")
                        .with("weight", Decimal::new(1250, 2))],
                ),
        );
        let dst = Arc::new(MemoryStore::new("warehouse").with_dialect("postgres"));

        CopyPipeline::new(job(&src, &dst).with_verify(true), HookRegistry::with_builtins())
            .with_progress(NoProgress)
            .run()
            .await
            .unwrap();

        let created = dst.schema("species").unwrap();
        assert_eq!(
            created.get_column("code").unwrap().column_type,
            ColumnType::String { size: Some(6) }
        );
        assert_eq!(
            created.get_column("weight").unwrap().column_type,
            ColumnType::Double
        );
    }

    #[test]
    fn test_summary_display_groups_thousands() {
        let summary = SourceSummary {
            tables: 12,
            records: 1_234_567,
        };
        assert_eq!(summary.to_string(), "12 tables, 1,234,567 records");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(0), "0");
    }

    #[test]
    fn test_job_exclusion_is_exact() {
        let job = CopyJob::new(
            Arc::new(MemoryStore::new("a")),
            Arc::new(MemoryStore::new("b")),
        )
        .with_exclude(["logs"])
        .with_workers(0);
        assert!(job.is_excluded("logs"));
        assert!(!job.is_excluded("Logs"));
        assert!(!job.is_excluded("logs_archive"));
        assert_eq!(job.workers(), 1);
    }
}
