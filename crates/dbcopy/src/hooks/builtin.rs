//! Built-in dialect corrections.
//!
//! Registered by [`HookRegistry::with_builtins`](super::HookRegistry::with_builtins)
//! in the order returned by [`builtins`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::core::schema::{ColumnType, DefaultValue, PrimaryKeyStyle, TableSchema};
use crate::core::traits::DdlStatement;
use crate::core::value::SqlValue;
use crate::error::Result;

use super::{DialectFilter, Event, Hook, HookArgs, HookContext, HookRole, Stage};

/// Session mode that keeps explicit zero values in AUTO_INCREMENT columns.
pub const MYSQL_SQL_MODE: &str = "SET sql_mode = 'NO_AUTO_VALUE_ON_ZERO'";

/// The built-in hooks, in registration order.
pub fn builtins() -> Vec<Arc<dyn Hook>> {
    vec![
        Arc::new(MySqlSqlMode::new()),
        Arc::new(BooleanDefaults::new(
            "postgres-boolean-defaults",
            HookRole::Destination,
            "postgres",
        )),
        Arc::new(BooleanDefaults::new(
            "mysql-boolean-defaults",
            HookRole::Source,
            "mysql",
        )),
        Arc::new(AccessStringKey::new()),
        Arc::new(AccessDecimalToDouble::new()),
    ]
}

/// Borrow the table definition out of a `create_table` context.
fn table_schema<'c>(ctx: &'c mut HookContext<'_>) -> Option<&'c mut TableSchema> {
    match &mut ctx.args {
        HookArgs::Table { schema, .. } => Some(&mut **schema),
        _ => None,
    }
}

/// MySQL destination: stop MySQL from replacing an explicit 0 in an
/// AUTO_INCREMENT column with the next sequence value.
pub struct MySqlSqlMode {
    dialect: DialectFilter,
}

impl MySqlSqlMode {
    pub fn new() -> Self {
        Self {
            dialect: DialectFilter::named("mysql"),
        }
    }
}

impl Default for MySqlSqlMode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Hook for MySqlSqlMode {
    fn name(&self) -> &str {
        "mysql-sql-mode"
    }

    fn stage(&self) -> Stage {
        Stage::before(Event::CopySchema)
    }

    fn role(&self) -> HookRole {
        HookRole::Destination
    }

    fn dialect(&self) -> &DialectFilter {
        &self.dialect
    }

    async fn apply(&self, ctx: &mut HookContext<'_>) -> Result<()> {
        ctx.destination
            .execute_ddl(&DdlStatement::SessionSetting(MYSQL_SQL_MODE.to_string()))
            .await
    }
}

/// Boolean columns whose default was dumped as a digit (`0`, `1`) get a real
/// boolean default. Zero is false, anything else is true.
///
/// Some older PostgreSQL dump tooling inverted this and turned `0` into
/// `true`; that inversion is intentionally not reproduced.
pub struct BooleanDefaults {
    name: &'static str,
    role: HookRole,
    dialect: DialectFilter,
}

impl BooleanDefaults {
    pub fn new(name: &'static str, role: HookRole, dialect: &str) -> Self {
        Self {
            name,
            role,
            dialect: DialectFilter::named(dialect),
        }
    }
}

/// Numeric value of a digit default, if it is one.
fn digit_default(default: &DefaultValue) -> Option<i64> {
    match default {
        DefaultValue::Literal(SqlValue::Text(s)) | DefaultValue::Expression(s) => {
            let trimmed = s.trim().trim_matches('\'');
            if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
                trimmed.parse().ok()
            } else {
                None
            }
        }
        DefaultValue::Literal(v) => v.as_i64(),
    }
}

#[async_trait]
impl Hook for BooleanDefaults {
    fn name(&self) -> &str {
        self.name
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

    async fn apply(&self, ctx: &mut HookContext<'_>) -> Result<()> {
        let Some(schema) = table_schema(ctx) else {
            return Ok(());
        };
        for column in schema
            .columns
            .iter_mut()
            .filter(|c| c.column_type == ColumnType::Boolean)
        {
            if let Some(n) = column.default.as_ref().and_then(digit_default) {
                column.default = Some(DefaultValue::Literal(SqlValue::Bool(n != 0)));
            }
        }
        Ok(())
    }
}

/// Access source: a single string primary key is reported with twice its
/// real width. Halve it and declare the key as a table constraint.
pub struct AccessStringKey {
    dialect: DialectFilter,
}

impl AccessStringKey {
    pub fn new() -> Self {
        Self {
            dialect: DialectFilter::named("access"),
        }
    }
}

impl Default for AccessStringKey {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Hook for AccessStringKey {
    fn name(&self) -> &str {
        "access-string-primary-key"
    }

    fn stage(&self) -> Stage {
        Stage::before(Event::CreateTable)
    }

    fn role(&self) -> HookRole {
        HookRole::Source
    }

    fn dialect(&self) -> &DialectFilter {
        &self.dialect
    }

    async fn apply(&self, ctx: &mut HookContext<'_>) -> Result<()> {
        let Some(schema) = table_schema(ctx) else {
            return Ok(());
        };
        let key_column = match schema.pk_columns() {
            [single] => single.clone(),
            _ => return Ok(()),
        };
        let Some(column) = schema.get_column_mut(&key_column) else {
            return Ok(());
        };

        let halved = match &mut column.column_type {
            ColumnType::String { size: Some(n) } | ColumnType::FixedString { size: n } => {
                *n = (*n / 2).max(1);
                *n
            }
            _ => return Ok(()),
        };
        column.is_nullable = false;
        debug!(
            "{}: primary key {} narrowed to {}",
            schema.name, key_column, halved
        );

        if let Some(pk) = schema.primary_key.as_mut() {
            pk.style = PrimaryKeyStyle::Constraint;
        }
        Ok(())
    }
}

/// Access source: arbitrary-precision decimals become doubles so the
/// destination does not reject values the source stored loosely.
pub struct AccessDecimalToDouble {
    dialect: DialectFilter,
}

impl AccessDecimalToDouble {
    pub fn new() -> Self {
        Self {
            dialect: DialectFilter::named("access"),
        }
    }
}

impl Default for AccessDecimalToDouble {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Hook for AccessDecimalToDouble {
    fn name(&self) -> &str {
        "access-decimal-to-double"
    }

    fn stage(&self) -> Stage {
        Stage::before(Event::CreateTable)
    }

    fn role(&self) -> HookRole {
        HookRole::Source
    }

    fn dialect(&self) -> &DialectFilter {
        &self.dialect
    }

    async fn apply(&self, ctx: &mut HookContext<'_>) -> Result<()> {
        let Some(schema) = table_schema(ctx) else {
            return Ok(());
        };
        for column in schema.columns.iter_mut() {
            if matches!(column.column_type, ColumnType::Decimal { .. }) {
                column.column_type = ColumnType::Double;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ColumnSpec;
    use crate::drivers::memory::MemoryStore;
    use crate::hooks::HookRegistry;

    async fn create_table_hooks(source: &str, destination: &str, schema: &mut TableSchema) {
        let src = MemoryStore::new("src").with_dialect(source);
        let dst = MemoryStore::new("dst").with_dialect(destination);
        let mut ctx = HookContext::new(
            &src,
            &dst,
            HookArgs::Table {
                table: "t",
                schema,
            },
        );
        HookRegistry::with_builtins()
            .dispatch(Stage::before(Event::CreateTable), &mut ctx)
            .await
            .unwrap();
    }

    fn flags() -> TableSchema {
        TableSchema::new("flags")
            .column(
                ColumnSpec::new("off", ColumnType::Boolean)
                    .default_value(DefaultValue::Literal(SqlValue::I32(0))),
            )
            .column(
                ColumnSpec::new("on", ColumnType::Boolean)
                    .default_value(DefaultValue::Expression("1".into())),
            )
            .column(
                ColumnSpec::new("count", ColumnType::Integer)
                    .default_value(DefaultValue::Literal(SqlValue::I32(0))),
            )
    }

    #[tokio::test]
    async fn test_boolean_defaults_for_postgres_destination() {
        let mut schema = flags();
        create_table_hooks("memory", "postgres", &mut schema).await;
        assert_eq!(
            schema.columns[0].default,
            Some(DefaultValue::Literal(SqlValue::Bool(false)))
        );
        assert_eq!(
            schema.columns[1].default,
            Some(DefaultValue::Literal(SqlValue::Bool(true)))
        );
        // Non-boolean columns keep their default
        assert_eq!(
            schema.columns[2].default,
            Some(DefaultValue::Literal(SqlValue::I32(0)))
        );
    }

    #[tokio::test]
    async fn test_boolean_defaults_for_mysql_source() {
        let mut schema = flags();
        create_table_hooks("mariadb", "memory", &mut schema).await;
        assert_eq!(
            schema.columns[0].default,
            Some(DefaultValue::Literal(SqlValue::Bool(false)))
        );
    }

    #[tokio::test]
    async fn test_boolean_defaults_not_applied_for_postgres_source() {
        let mut schema = flags();
        create_table_hooks("postgres", "memory", &mut schema).await;
        assert_eq!(
            schema.columns[0].default,
            Some(DefaultValue::Literal(SqlValue::I32(0)))
        );
    }

    #[tokio::test]
    async fn test_access_string_key_is_halved_and_standalone() {
        let mut schema = TableSchema::new("species")
            .column(ColumnSpec::new("code", ColumnType::String { size: Some(20) }).primary_key())
            .column(ColumnSpec::new("name", ColumnType::String { size: Some(100) }));
        create_table_hooks("access", "postgres", &mut schema).await;

        let code = schema.get_column("code").unwrap();
        assert_eq!(code.column_type, ColumnType::String { size: Some(10) });
        assert!(!code.is_nullable);
        assert_eq!(
            schema.primary_key.as_ref().unwrap().style,
            PrimaryKeyStyle::Constraint
        );
        // Only the key is narrowed
        assert_eq!(
            schema.get_column("name").unwrap().column_type,
            ColumnType::String { size: Some(100) }
        );
    }

    #[tokio::test]
    async fn test_access_integer_key_is_untouched() {
        let mut schema = TableSchema::new("sites")
            .column(ColumnSpec::new("id", ColumnType::Integer).primary_key());
        create_table_hooks("access", "postgres", &mut schema).await;
        assert_eq!(
            schema.primary_key.as_ref().unwrap().style,
            PrimaryKeyStyle::Inline
        );
    }

    #[tokio::test]
    async fn test_access_string_key_needs_access_source() {
        let mut schema = TableSchema::new("species")
            .column(ColumnSpec::new("code", ColumnType::String { size: Some(20) }).primary_key());
        create_table_hooks("postgres", "access", &mut schema).await;
        assert_eq!(
            schema.get_column("code").unwrap().column_type,
            ColumnType::String { size: Some(20) }
        );
    }

    #[tokio::test]
    async fn test_access_decimal_becomes_double() {
        let mut schema = TableSchema::new("catches").column(ColumnSpec::new(
            "weight",
            ColumnType::Decimal {
                precision: 10,
                scale: 3,
            },
        ));
        create_table_hooks("msaccess", "mysql", &mut schema).await;
        assert_eq!(schema.columns[0].column_type, ColumnType::Double);
    }

    #[tokio::test]
    async fn test_mysql_destination_sets_sql_mode() {
        let src = MemoryStore::new("src").with_dialect("postgres");
        let dst = MemoryStore::new("dst").with_dialect("mysql");
        let mut ctx = HookContext::new(&src, &dst, HookArgs::Phase);
        HookRegistry::with_builtins()
            .dispatch(Stage::before(Event::CopySchema), &mut ctx)
            .await
            .unwrap();
        assert_eq!(
            dst.executed_ddl(),
            vec![DdlStatement::SessionSetting(MYSQL_SQL_MODE.to_string())]
        );
        assert!(src.executed_ddl().is_empty());
    }
}
