//! Core abstractions shared by the engine and the drivers.
//!
//! - [`schema`]: table, column, key and index definitions
//! - [`value`]: owned SQL values and rows
//! - [`filter`]: row lookups, with a tolerance for temporal columns
//! - [`traits`]: the [`DataStore`] contract and structured DDL
//!
//! Driver modules implement [`DataStore`]; the pipeline, translator, hooks
//! and verifier depend only on this module.

pub mod filter;
pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use filter::{Condition, RowFilter};
pub use schema::{
    ColumnSpec, ColumnType, DefaultValue, IndexSpec, PrimaryKey, PrimaryKeyStyle, TableSchema,
};
pub use traits::{DataStore, DdlStatement, StoreRole, TableRef, ROW_CHANNEL_CAPACITY};
pub use value::{Row, SqlValue};
