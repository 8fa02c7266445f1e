//! MySQL/MariaDB SQL dialect (Strategy pattern).
//!
//! Backtick quoting, `?` placeholders, and MySQL type names. Tables are left
//! unqualified; the connection's default database is the namespace.

use crate::core::identifier::quote_mysql;
use crate::core::schema::ColumnType;
use crate::core::value::SqlValue;
use crate::dialect::{default_literal, unrenderable, Dialect, NativeType};
use crate::error::Result;

/// Largest VARCHAR length rendered as VARCHAR; longer strings become text.
const MAX_VARCHAR: u32 = 16_383;

/// MySQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MySqlDialect;

impl MySqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MySqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_mysql(name)
    }

    fn param_placeholder(&self, _index: usize) -> String {
        // MySQL uses ? for all placeholders
        "?".to_string()
    }

    fn render_type(&self, column_type: &ColumnType) -> Result<String> {
        let rendered = match column_type {
            ColumnType::Boolean => "tinyint(1)".to_string(),
            ColumnType::SmallInt => "smallint".to_string(),
            ColumnType::Integer => "int".to_string(),
            ColumnType::BigInt => "bigint".to_string(),
            ColumnType::Float => "float".to_string(),
            ColumnType::Double => "double".to_string(),
            ColumnType::Decimal { precision, scale } => {
                let p = (*precision).clamp(1, 65);
                let s = (*scale).min(30).min(p);
                format!("decimal({},{})", p, s)
            }
            ColumnType::String { size: Some(n) } if *n <= MAX_VARCHAR => format!("varchar({})", n),
            ColumnType::String { .. } => "longtext".to_string(),
            ColumnType::FixedString { size } if *size <= 255 => format!("char({})", size),
            ColumnType::FixedString { size } => format!("varchar({})", size),
            ColumnType::Text => "longtext".to_string(),
            ColumnType::Binary { size: Some(n) } if *n <= 65_535 => format!("varbinary({})", n),
            ColumnType::Binary { .. } => "longblob".to_string(),
            ColumnType::Date => "date".to_string(),
            ColumnType::Time => "time(6)".to_string(),
            ColumnType::DateTime | ColumnType::DateTimeTz => "datetime(6)".to_string(),
            ColumnType::Uuid => "char(36)".to_string(),
            ColumnType::Json => "json".to_string(),
            ColumnType::Unknown(_) => return Err(unrenderable(self.name(), column_type)),
        };
        Ok(rendered)
    }

    fn map_native_type(&self, native: &NativeType) -> ColumnType {
        let mysql_lower = native.data_type.to_lowercase();
        let declared = native
            .column_type
            .as_deref()
            .unwrap_or("")
            .to_lowercase();

        // BOOLEAN is stored as TINYINT(1); the width only shows in COLUMN_TYPE.
        let is_tinyint_bool = mysql_lower == "tinyint"
            && (native.max_length == 1 || declared.starts_with("tinyint(1)"));

        match mysql_lower.as_str() {
            "bool" | "boolean" => ColumnType::Boolean,
            "tinyint" if is_tinyint_bool => ColumnType::Boolean,
            "bit" if native.precision <= 1 => ColumnType::Boolean,

            "tinyint" | "smallint" | "year" => ColumnType::SmallInt,
            "mediumint" | "int" | "integer" => {
                if declared.contains("unsigned") {
                    ColumnType::BigInt
                } else {
                    ColumnType::Integer
                }
            }
            "bigint" => ColumnType::BigInt,

            "float" => ColumnType::Float,
            "double" | "double precision" | "real" => ColumnType::Double,

            "decimal" | "numeric" | "dec" | "fixed" => ColumnType::Decimal {
                precision: if native.precision > 0 {
                    native.precision as u32
                } else {
                    10
                },
                scale: native.scale.max(0) as u32,
            },

            "char" => ColumnType::FixedString {
                size: native.length().unwrap_or(1),
            },
            "varchar" => ColumnType::String {
                size: Some(native.length().unwrap_or(255)),
            },
            "tinytext" | "text" | "mediumtext" | "longtext" | "enum" | "set" => ColumnType::Text,

            "binary" | "varbinary" => ColumnType::Binary {
                size: native.length(),
            },
            "tinyblob" | "blob" | "mediumblob" | "longblob" => ColumnType::Binary { size: None },

            "date" => ColumnType::Date,
            "time" => ColumnType::Time,
            "datetime" | "timestamp" => ColumnType::DateTime,

            "json" => ColumnType::Json,

            _ => ColumnType::Unknown(native.data_type.clone()),
        }
    }

    fn render_literal(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Bool(true) => "1".to_string(),
            SqlValue::Bool(false) => "0".to_string(),
            other => default_literal(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{ColumnSpec, DefaultValue, TableSchema};

    #[test]
    fn test_quote_ident() {
        let d = MySqlDialect::new();
        assert_eq!(d.quote_ident("users").unwrap(), "`users`");
        assert_eq!(d.qualify("users").unwrap(), "`users`");
    }

    #[test]
    fn test_param_placeholder() {
        let d = MySqlDialect::new();
        assert_eq!(d.param_placeholder(1), "?");
        assert_eq!(d.param_placeholder(10), "?");
    }

    #[test]
    fn test_insert() {
        let d = MySqlDialect::new();
        assert_eq!(
            d.insert("accounts", &["id", "name"]).unwrap(),
            "INSERT INTO `accounts` (`id`, `name`) VALUES (?, ?)"
        );
    }

    #[test]
    fn test_keyless_page_orders_by_every_column() {
        let d = MySqlDialect::new();
        let logs = TableSchema::new("logs")
            .column(ColumnSpec::new("kind", ColumnType::Text))
            .column(ColumnSpec::new("at", ColumnType::DateTime));
        let order = d.page_order(&logs);
        assert_eq!(
            d.select_page("logs", &order, 20, 10).unwrap(),
            "SELECT * FROM `logs` ORDER BY `kind`, `at` LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn test_tinyint_one_is_boolean() {
        let d = MySqlDialect::new();
        let mut native = NativeType::new("tinyint");
        native.column_type = Some("tinyint(1)".into());
        assert_eq!(d.map_native_type(&native), ColumnType::Boolean);

        native.column_type = Some("tinyint(4)".into());
        assert_eq!(d.map_native_type(&native), ColumnType::SmallInt);
    }

    #[test]
    fn test_unsigned_int_widens() {
        let d = MySqlDialect::new();
        let mut native = NativeType::new("int");
        native.column_type = Some("int(10) unsigned".into());
        assert_eq!(d.map_native_type(&native), ColumnType::BigInt);
    }

    #[test]
    fn test_render_types() {
        let d = MySqlDialect::new();
        assert_eq!(d.render_type(&ColumnType::Boolean).unwrap(), "tinyint(1)");
        assert_eq!(
            d.render_type(&ColumnType::String { size: Some(50) }).unwrap(),
            "varchar(50)"
        );
        assert_eq!(
            d.render_type(&ColumnType::String { size: Some(100_000) }).unwrap(),
            "longtext"
        );
        assert_eq!(
            d.render_type(&ColumnType::Decimal {
                precision: 80,
                scale: 40
            })
            .unwrap(),
            "decimal(65,30)"
        );
    }

    #[test]
    fn test_boolean_default_renders_as_digit() {
        let d = MySqlDialect::new();
        let schema = TableSchema::new("flags").column(
            ColumnSpec::new("active", ColumnType::Boolean)
                .not_null()
                .default_value(DefaultValue::Literal(SqlValue::Bool(true))),
        );
        assert_eq!(
            d.create_table(&schema).unwrap(),
            "CREATE TABLE `flags` (`active` tinyint(1) NOT NULL DEFAULT 1)"
        );
    }
}
