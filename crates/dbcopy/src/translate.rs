//! Schema translation: source introspection to a destination-ready table
//! definition.
//!
//! The translator only assembles. Native type mapping belongs to the source
//! store's dialect, corrections belong to hooks, and rendering belongs to the
//! destination store.

use tracing::debug;

use crate::core::schema::TableSchema;
use crate::core::traits::DataStore;
use crate::error::{CopyError, Result};
use crate::hooks::{Event, HookArgs, HookContext, HookRegistry, Stage};

/// Builds destination table definitions.
pub struct SchemaTranslator<'a> {
    hooks: &'a HookRegistry,
}

impl<'a> SchemaTranslator<'a> {
    pub fn new(hooks: &'a HookRegistry) -> Self {
        Self { hooks }
    }

    /// Introspect `table` on the source, run the `before create_table` hooks
    /// over it, and check it can be rendered.
    ///
    /// The returned definition has no secondary indexes; those are copied in
    /// the index phase.
    pub async fn translate(
        &self,
        table: &str,
        source: &dyn DataStore,
        destination: &dyn DataStore,
    ) -> Result<TableSchema> {
        let mut schema = source.introspect_schema(table).await?;
        schema.indexes.clear();

        let mut ctx = HookContext::new(
            source,
            destination,
            HookArgs::Table {
                table,
                schema: &mut schema,
            },
        );
        self.hooks
            .dispatch(Stage::before(Event::CreateTable), &mut ctx)
            .await?;

        schema
            .validate()
            .map_err(|message| CopyError::schema(table, message))?;

        debug!(
            "{}: translated {} columns (key: {:?})",
            table,
            schema.columns.len(),
            schema.pk_columns()
        );
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{ColumnSpec, ColumnType, IndexSpec};
    use crate::drivers::memory::MemoryStore;
    use crate::hooks::{DialectFilter, HookRole};

    fn geo_table() -> TableSchema {
        TableSchema::new("sites")
            .column(ColumnSpec::new("id", ColumnType::Integer).primary_key())
            .column(ColumnSpec::new("shape", ColumnType::Unknown("geometry".into())))
            .index(IndexSpec::new("ix_sites_shape", vec!["shape".into()], false))
    }

    #[tokio::test]
    async fn test_unmapped_type_is_schema_error() {
        let source = MemoryStore::new("src").with_table(geo_table(), vec![]);
        let destination = MemoryStore::new("dst");
        let hooks = HookRegistry::new();

        let err = SchemaTranslator::new(&hooks)
            .translate("sites", &source, &destination)
            .await
            .unwrap_err();
        match err {
            CopyError::SchemaTranslation { table, message } => {
                assert_eq!(table, "sites");
                assert!(message.contains("geometry"));
            }
            other => panic!("expected schema translation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_hook_can_correct_unmapped_type() {
        let source = MemoryStore::new("src").with_table(geo_table(), vec![]);
        let destination = MemoryStore::new("dst");
        let mut hooks = HookRegistry::new();
        hooks.before(
            "geometry-as-text",
            Event::CreateTable,
            HookRole::Both,
            DialectFilter::Any,
            |ctx| {
                if let HookArgs::Table { schema, .. } = &mut ctx.args {
                    for col in schema.columns.iter_mut() {
                        if matches!(col.column_type, ColumnType::Unknown(_)) {
                            col.column_type = ColumnType::Text;
                        }
                    }
                }
                Ok(())
            },
        );

        let schema = SchemaTranslator::new(&hooks)
            .translate("sites", &source, &destination)
            .await
            .unwrap();
        assert_eq!(schema.get_column("shape").unwrap().column_type, ColumnType::Text);
        assert!(schema.indexes.is_empty());
        assert_eq!(schema.pk_columns(), ["id".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_table_propagates_store_error() {
        let source = MemoryStore::new("src");
        let destination = MemoryStore::new("dst");
        let hooks = HookRegistry::new();
        assert!(SchemaTranslator::new(&hooks)
            .translate("nope", &source, &destination)
            .await
            .is_err());
    }
}
