//! # dbcopy
//!
//! Copy a whole relational database into another store, possibly of a
//! different SQL product, and optionally verify the result row by row.
//!
//! A run has four phases, each finished for every table before the next
//! begins:
//!
//! 1. **Schema**: every source table is introspected, translated into the
//!    destination's type system and created there (no secondary indexes).
//! 2. **Data**: rows are read page by page (or in one unbounded stream) and
//!    inserted one at a time.
//! 3. **Indexes**: secondary indexes are created once the data is in.
//! 4. **Verify** (optional): every source row is looked up in the
//!    destination and compared, with a tolerance for temporal columns.
//!
//! Product quirks (MySQL's `sql_mode`, boolean defaults on PostgreSQL,
//! Microsoft Access key widths) are not special-cased in the pipeline. They
//! are [`hooks`] keyed on lifecycle stage and dialect, held in a
//! [`HookRegistry`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use dbcopy::{drivers, CopyJob, CopyPipeline, HookRegistry, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> dbcopy::Result<()> {
//!     let source = drivers::connect(&StoreConfig::new("postgres://u:p@localhost/app")).await?;
//!     let destination = drivers::connect(&StoreConfig::new("mysql://u:p@localhost/copy")).await?;
//!
//!     let job = CopyJob::new(source, destination).with_verify(true);
//!     let report = CopyPipeline::new(job, HookRegistry::with_builtins()).run().await?;
//!     println!("{}: {} rows copied", report.summary, report.rows_copied);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod hooks;
pub mod pipeline;
pub mod translate;
pub mod verify;

// Re-exports for convenient access
pub use config::{Config, CopyConfig, PageSize, StoreConfig, StoreKind};
pub use crate::core::{
    ColumnSpec, ColumnType, DataStore, DdlStatement, IndexSpec, Row, RowFilter, SqlValue,
    TableSchema,
};
pub use error::{CopyError, Result};
pub use hooks::{Event, Hook, HookArgs, HookContext, HookRegistry, HookRole, Stage};
pub use pipeline::{CopyJob, CopyPipeline, CopyReport, SourceSummary};
pub use translate::SchemaTranslator;
pub use verify::Verifier;
