//! PostgreSQL SQL dialect (Strategy pattern).
//!
//! Provides PostgreSQL-specific identifier quoting, type names, literals and
//! parameter placeholders. Tables are qualified with the configured schema.

use crate::core::identifier::{qualify_pg, quote_pg};
use crate::core::schema::{ColumnType, TableSchema};
use crate::core::value::SqlValue;
use crate::dialect::{default_literal, hex, unrenderable, Dialect, NativeType};
use crate::error::Result;

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone)]
pub struct PostgresDialect {
    schema: String,
}

impl PostgresDialect {
    /// Create a dialect that qualifies tables with `schema`.
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self::new("public")
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_pg(name)
    }

    fn qualify(&self, table: &str) -> Result<String> {
        qualify_pg(&self.schema, table)
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn render_type(&self, column_type: &ColumnType) -> Result<String> {
        let rendered = match column_type {
            ColumnType::Boolean => "boolean".to_string(),
            ColumnType::SmallInt => "smallint".to_string(),
            ColumnType::Integer => "integer".to_string(),
            ColumnType::BigInt => "bigint".to_string(),
            ColumnType::Float => "real".to_string(),
            ColumnType::Double => "double precision".to_string(),
            ColumnType::Decimal { precision, scale } => {
                format!("numeric({},{})", precision, scale)
            }
            ColumnType::String { size: Some(n) } => format!("varchar({})", n),
            ColumnType::String { size: None } => "varchar".to_string(),
            ColumnType::FixedString { size } => format!("char({})", size),
            ColumnType::Text => "text".to_string(),
            ColumnType::Binary { .. } => "bytea".to_string(),
            ColumnType::Date => "date".to_string(),
            ColumnType::Time => "time".to_string(),
            ColumnType::DateTime => "timestamp".to_string(),
            ColumnType::DateTimeTz => "timestamptz".to_string(),
            ColumnType::Uuid => "uuid".to_string(),
            ColumnType::Json => "jsonb".to_string(),
            ColumnType::Unknown(_) => return Err(unrenderable(self.name(), column_type)),
        };
        Ok(rendered)
    }

    fn map_native_type(&self, native: &NativeType) -> ColumnType {
        let pg_lower = native.data_type.to_lowercase();
        match pg_lower.as_str() {
            "bool" | "boolean" => ColumnType::Boolean,

            "int2" | "smallint" | "smallserial" => ColumnType::SmallInt,
            "int4" | "integer" | "int" | "serial" => ColumnType::Integer,
            "int8" | "bigint" | "bigserial" | "oid" => ColumnType::BigInt,

            "float4" | "real" => ColumnType::Float,
            "float8" | "double precision" => ColumnType::Double,

            "numeric" | "decimal" => ColumnType::Decimal {
                precision: if native.precision > 0 {
                    native.precision as u32
                } else {
                    38
                },
                scale: native.scale.max(0) as u32,
            },
            "money" => ColumnType::Decimal {
                precision: 19,
                scale: 2,
            },

            "char" | "character" | "bpchar" => ColumnType::FixedString {
                size: native.length().unwrap_or(1),
            },
            "varchar" | "character varying" => ColumnType::String {
                size: native.length(),
            },
            "name" => ColumnType::String { size: Some(63) },
            "text" | "citext" | "xml" => ColumnType::Text,

            "bytea" => ColumnType::Binary { size: None },

            "date" => ColumnType::Date,
            "time" | "time without time zone" => ColumnType::Time,
            "timestamp" | "timestamp without time zone" => ColumnType::DateTime,
            "timestamptz" | "timestamp with time zone" => ColumnType::DateTimeTz,

            "uuid" => ColumnType::Uuid,
            "json" | "jsonb" => ColumnType::Json,

            _ => ColumnType::Unknown(native.data_type.clone()),
        }
    }

    fn page_order(&self, schema: &TableSchema) -> Vec<String> {
        match schema.pk_columns() {
            // physical row location; stable while nothing writes the table
            [] => vec!["ctid".to_string()],
            key => key.to_vec(),
        }
    }

    fn render_literal(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Bytes(v) => format!("'\\x{}'::bytea", hex(v)),
            SqlValue::F64(v) if v.is_nan() => "'NaN'::double precision".to_string(),
            other => default_literal(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{ColumnSpec, DefaultValue, IndexSpec, PrimaryKeyStyle, TableSchema};
    use crate::core::filter::RowFilter;
    use crate::core::value::Row;

    fn accounts() -> TableSchema {
        TableSchema::new("accounts")
            .column(ColumnSpec::new("id", ColumnType::Integer).primary_key())
            .column(ColumnSpec::new("name", ColumnType::String { size: Some(50) }).not_null())
            .column(ColumnSpec::new(
                "balance",
                ColumnType::Decimal {
                    precision: 10,
                    scale: 2,
                },
            ))
            .column(ColumnSpec::new("created_at", ColumnType::DateTime))
    }

    #[test]
    fn test_quote_ident() {
        let d = PostgresDialect::default();
        assert_eq!(d.quote_ident("users").unwrap(), "\"users\"");
        assert_eq!(d.qualify("users").unwrap(), "\"public\".\"users\"");
    }

    #[test]
    fn test_param_placeholder() {
        let d = PostgresDialect::default();
        assert_eq!(d.param_placeholder(1), "$1");
        assert_eq!(d.param_placeholder(10), "$10");
    }

    #[test]
    fn test_create_table_inline_key() {
        let d = PostgresDialect::default();
        let sql = d.create_table(&accounts()).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE \"public\".\"accounts\" (\"id\" integer NOT NULL PRIMARY KEY, \
             \"name\" varchar(50) NOT NULL, \"balance\" numeric(10,2), \"created_at\" timestamp)"
        );
    }

    #[test]
    fn test_create_table_constraint_key() {
        let d = PostgresDialect::new("app");
        let mut schema = TableSchema::new("codes")
            .column(ColumnSpec::new("code", ColumnType::String { size: Some(10) }).primary_key());
        schema.primary_key.as_mut().unwrap().style = PrimaryKeyStyle::Constraint;
        let sql = d.create_table(&schema).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE \"app\".\"codes\" (\"code\" varchar(10) NOT NULL, PRIMARY KEY (\"code\"))"
        );
    }

    #[test]
    fn test_boolean_default_literal() {
        let d = PostgresDialect::default();
        let schema = TableSchema::new("flags").column(
            ColumnSpec::new("active", ColumnType::Boolean)
                .default_value(DefaultValue::Literal(SqlValue::Bool(false))),
        );
        let sql = d.create_table(&schema).unwrap();
        assert!(sql.contains("\"active\" boolean DEFAULT FALSE"));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let d = PostgresDialect::default();
        let schema = TableSchema::new("geo")
            .column(ColumnSpec::new("shape", ColumnType::Unknown("geometry".into())));
        assert!(d.create_table(&schema).is_err());
    }

    #[test]
    fn test_create_index() {
        let d = PostgresDialect::default();
        let idx = IndexSpec::new("ix_accounts_name", vec!["name".into()], true);
        assert_eq!(
            d.create_index("accounts", &idx).unwrap(),
            "CREATE UNIQUE INDEX \"ix_accounts_name\" ON \"public\".\"accounts\" (\"name\")"
        );
    }

    #[test]
    fn test_select_page_orders_by_key() {
        let d = PostgresDialect::default();
        assert_eq!(
            d.select_page("accounts", &["id".to_string()], 4, 2).unwrap(),
            "SELECT * FROM \"public\".\"accounts\" ORDER BY \"id\" LIMIT 2 OFFSET 4"
        );
    }

    #[test]
    fn test_keyless_page_orders_by_ctid() {
        let d = PostgresDialect::default();
        let logs = TableSchema::new("logs")
            .column(ColumnSpec::new("kind", ColumnType::Text))
            .column(ColumnSpec::new("at", ColumnType::DateTime));
        let order = d.page_order(&logs);
        assert_eq!(order, vec!["ctid".to_string()]);
        assert_eq!(
            d.select_page("logs", &order, 0, 100).unwrap(),
            "SELECT * FROM \"public\".\"logs\" ORDER BY \"ctid\" LIMIT 100 OFFSET 0"
        );
        assert_eq!(d.page_order(&accounts()), vec!["id".to_string()]);
    }

    #[test]
    fn test_select_page_requires_order() {
        let d = PostgresDialect::default();
        assert!(d.select_page("logs", &[], 0, 100).is_err());
    }

    #[test]
    fn test_select_matching_handles_null() {
        let d = PostgresDialect::default();
        let filter = RowFilter::new(
            Row::new()
                .with("id", 1)
                .with("note", SqlValue::Null)
                .with("name", "a"),
        );
        assert_eq!(
            d.select_matching("accounts", &filter).unwrap(),
            "SELECT * FROM \"public\".\"accounts\" WHERE \"id\" = $1 AND \"note\" IS NULL \
             AND \"name\" = $2 LIMIT 1"
        );
    }

    #[test]
    fn test_select_matching_windows_timestamps() {
        let d = PostgresDialect::default();
        let at = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 30)
            .unwrap();
        let row = Row::new()
            .with("kind", "login")
            .with("at", at)
            .with("n", 3);
        let filter = RowFilter::new(row).with_tolerance(std::time::Duration::from_secs(1));
        assert_eq!(
            d.select_matching("audit", &filter).unwrap(),
            "SELECT * FROM \"public\".\"audit\" WHERE \"kind\" = $1 \
             AND \"at\" >= $2 AND \"at\" <= $3 AND \"n\" = $4 LIMIT 1"
        );
        assert_eq!(filter.bound_values().len(), 4);
    }

    #[test]
    fn test_map_native_types() {
        let d = PostgresDialect::default();
        assert_eq!(d.map_native_type(&NativeType::new("int4")), ColumnType::Integer);
        assert_eq!(
            d.map_native_type(&NativeType::new("numeric").with_precision(10, 2)),
            ColumnType::Decimal {
                precision: 10,
                scale: 2
            }
        );
        assert_eq!(
            d.map_native_type(&NativeType::new("varchar").with_length(50)),
            ColumnType::String { size: Some(50) }
        );
        assert_eq!(
            d.map_native_type(&NativeType::new("tsvector")),
            ColumnType::Unknown("tsvector".into())
        );
    }

    #[test]
    fn test_bytea_literal() {
        let d = PostgresDialect::default();
        assert_eq!(
            d.render_literal(&SqlValue::Bytes(vec![0xde, 0xad])),
            "'\\xdead'::bytea"
        );
    }
}
