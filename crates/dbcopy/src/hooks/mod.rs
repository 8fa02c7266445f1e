//! Dialect correction hooks.
//!
//! The pipeline is dialect-agnostic. Everything a particular product needs
//! fixed (boolean defaults, key widths, session modes) is expressed as a
//! [`Hook`] bound to a lifecycle [`Stage`], a [`HookRole`] and a
//! [`DialectFilter`], and held in a [`HookRegistry`] that is built once at
//! startup and passed into the pipeline.
//!
//! # Dispatch
//!
//! For an event with source dialect `Ds` and destination dialect `Dd`, a hook
//! filtered on dialect `D` fires when:
//!
//! | role          | fires when            |
//! |---------------|-----------------------|
//! | `Source`      | `D == Ds`             |
//! | `Destination` | `D == Dd`             |
//! | `Both`        | `D == Ds` or `D == Dd`|
//!
//! Hooks filtered on [`DialectFilter::Any`] always fire. Matching hooks run
//! in registration order, so when two hooks rewrite the same field the one
//! registered last wins.

pub mod builtin;
mod registry;

pub use registry::{FnHook, HookRegistry};

use std::fmt;

use async_trait::async_trait;

use crate::core::schema::{IndexSpec, TableSchema};
use crate::core::traits::DataStore;
use crate::core::value::Row;
use crate::dialect::normalize_dialect;
use crate::error::Result;
use crate::pipeline::RowPosition;

/// Before or after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum When {
    Before,
    After,
}

/// Pipeline lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// The whole schema phase. Fired once per run.
    CopySchema,
    /// One table's CREATE TABLE.
    CreateTable,
    /// The whole data phase. Fired once per run.
    CopyData,
    /// One row, around its insert.
    CopyRow,
    /// The whole index phase. Fired once per run.
    CopyIndexes,
    /// One table's secondary indexes.
    AddIndexes,
}

impl Event {
    /// Phase-level events carry no table arguments.
    pub fn is_phase(&self) -> bool {
        matches!(self, Event::CopySchema | Event::CopyData | Event::CopyIndexes)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Event::CopySchema => "copy_schema",
            Event::CreateTable => "create_table",
            Event::CopyData => "copy_data",
            Event::CopyRow => "copy_row",
            Event::CopyIndexes => "copy_indexes",
            Event::AddIndexes => "add_indexes",
        };
        f.write_str(name)
    }
}

/// A lifecycle stage: an event and which side of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Stage {
    pub when: When,
    pub event: Event,
}

impl Stage {
    pub const fn before(event: Event) -> Self {
        Self {
            when: When::Before,
            event,
        }
    }

    pub const fn after(event: Event) -> Self {
        Self {
            when: When::After,
            event,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.when {
            When::Before => write!(f, "before {}", self.event),
            When::After => write!(f, "after {}", self.event),
        }
    }
}

/// Which store's dialect a hook is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookRole {
    Source,
    Destination,
    Both,
}

/// Dialect a hook is registered for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialectFilter {
    /// Fires for every dialect pair.
    Any,
    /// Fires when the role's store reports this (normalized) dialect.
    Named(String),
}

impl DialectFilter {
    /// Filter on a dialect name. Aliases are normalized.
    pub fn named(name: &str) -> Self {
        DialectFilter::Named(normalize_dialect(name))
    }
}

impl fmt::Display for DialectFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialectFilter::Any => f.write_str("any"),
            DialectFilter::Named(name) => f.write_str(name),
        }
    }
}

/// Event arguments. Hooks mutate them in place; there is no other channel
/// back to the pipeline.
#[derive(Debug)]
pub enum HookArgs<'a> {
    /// Phase-level events.
    Phase,
    /// `create_table`: the destination definition before rendering.
    Table {
        table: &'a str,
        schema: &'a mut TableSchema,
    },
    /// `copy_row`: the row about to be (or just) inserted. `position` is
    /// `None` for unbounded copies.
    Row {
        table: &'a str,
        row: &'a mut Row,
        position: Option<RowPosition>,
    },
    /// `add_indexes`: the index definitions for one table.
    Indexes {
        table: &'a str,
        indexes: &'a mut Vec<IndexSpec>,
    },
}

impl HookArgs<'_> {
    /// Table the event concerns, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            HookArgs::Phase => None,
            HookArgs::Table { table, .. }
            | HookArgs::Row { table, .. }
            | HookArgs::Indexes { table, .. } => Some(table),
        }
    }
}

/// Everything a hook can see and touch.
pub struct HookContext<'a> {
    pub source: &'a dyn DataStore,
    pub destination: &'a dyn DataStore,
    pub args: HookArgs<'a>,
}

impl<'a> HookContext<'a> {
    pub fn new(
        source: &'a dyn DataStore,
        destination: &'a dyn DataStore,
        args: HookArgs<'a>,
    ) -> Self {
        Self {
            source,
            destination,
            args,
        }
    }
}

/// A dialect correction bound to a lifecycle stage.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    fn stage(&self) -> Stage;

    fn role(&self) -> HookRole;

    fn dialect(&self) -> &DialectFilter;

    /// Whether the hook fires for `stage` given the (normalized) dialects of
    /// both stores.
    fn applies(&self, stage: Stage, source_dialect: &str, destination_dialect: &str) -> bool {
        if self.stage() != stage {
            return false;
        }
        match self.dialect() {
            DialectFilter::Any => true,
            DialectFilter::Named(d) => match self.role() {
                HookRole::Source => d == source_dialect,
                HookRole::Destination => d == destination_dialect,
                HookRole::Both => d == source_dialect || d == destination_dialect,
            },
        }
    }

    /// Apply the correction.
    async fn apply(&self, ctx: &mut HookContext<'_>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe {
        role: HookRole,
        dialect: DialectFilter,
    }

    #[async_trait]
    impl Hook for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        fn stage(&self) -> Stage {
            Stage::before(Event::CreateTable)
        }

        fn role(&self) -> HookRole {
            self.role
        }

        fn dialect(&self) -> &DialectFilter {
            &self.dialect
        }

        async fn apply(&self, _ctx: &mut HookContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn probe(role: HookRole, dialect: DialectFilter) -> Probe {
        Probe { role, dialect }
    }

    #[test]
    fn test_destination_hook_matches_destination_dialect_only() {
        let hook = probe(HookRole::Destination, DialectFilter::named("postgres"));
        let stage = Stage::before(Event::CreateTable);
        assert!(hook.applies(stage, "mysql", "postgres"));
        assert!(hook.applies(stage, "postgres", "postgres"));
        assert!(!hook.applies(stage, "postgres", "mysql"));
    }

    #[test]
    fn test_source_hook_matches_source_dialect_only() {
        let hook = probe(HookRole::Source, DialectFilter::named("access"));
        let stage = Stage::before(Event::CreateTable);
        assert!(hook.applies(stage, "access", "postgres"));
        assert!(!hook.applies(stage, "postgres", "access"));
    }

    #[test]
    fn test_both_role_matches_either_side() {
        let hook = probe(HookRole::Both, DialectFilter::named("mysql"));
        let stage = Stage::before(Event::CreateTable);
        assert!(hook.applies(stage, "mysql", "postgres"));
        assert!(hook.applies(stage, "postgres", "mysql"));
        assert!(!hook.applies(stage, "postgres", "postgres"));
    }

    #[test]
    fn test_any_dialect_always_matches_its_stage() {
        let hook = probe(HookRole::Source, DialectFilter::Any);
        assert!(hook.applies(Stage::before(Event::CreateTable), "x", "y"));
        assert!(!hook.applies(Stage::after(Event::CreateTable), "x", "y"));
        assert!(!hook.applies(Stage::before(Event::CopyRow), "x", "y"));
    }

    #[test]
    fn test_filter_normalizes_aliases() {
        assert_eq!(
            DialectFilter::named("PostgreSQL"),
            DialectFilter::Named("postgres".into())
        );
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::before(Event::CopySchema).to_string(), "before copy_schema");
        assert_eq!(Stage::after(Event::AddIndexes).to_string(), "after add_indexes");
        assert!(Event::CopyData.is_phase());
        assert!(!Event::CopyRow.is_phase());
    }
}
