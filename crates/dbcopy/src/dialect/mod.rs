//! SQL dialect strategy.
//!
//! A [`Dialect`] turns the structured schema and row types into SQL text for
//! one database product. The trait supplies template implementations of the
//! statement builders; a dialect overrides only the pieces where its syntax
//! differs (quoting, placeholders, type names, literals).
//!
//! Native type names reported by introspection are mapped to the portable
//! [`ColumnType`] through [`Dialect::map_native_type`], so a new product
//! needs one mapping in each direction rather than one per product pair.

use crate::core::filter::{Condition, RowFilter};
use crate::core::identifier::validate_default_expression;
use crate::core::schema::{ColumnSpec, ColumnType, DefaultValue, IndexSpec, TableSchema};
use crate::core::value::SqlValue;
use crate::error::{CopyError, Result};

/// Canonical dialect name for a user-supplied alias.
///
/// Hook filters and store identifiers are compared after normalization, so
/// `postgresql://` and `pg` both select the `postgres` hooks.
pub fn normalize_dialect(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.as_str() {
        "postgresql" | "pg" | "postgres" => "postgres".to_string(),
        "mariadb" | "mysql" | "mysql2" => "mysql".to_string(),
        "msaccess" | "jet" | "ace" | "access" => "access".to_string(),
        _ => lower,
    }
}

/// Type metadata as reported by a store's information schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NativeType {
    /// Base type name (`DATA_TYPE` / `udt_name`).
    pub data_type: String,
    /// Full declared type when the store reports one (MySQL `COLUMN_TYPE`).
    pub column_type: Option<String>,
    /// Character or byte length; 0 when not applicable, -1 for "max".
    pub max_length: i64,
    pub precision: i64,
    pub scale: i64,
}

impl NativeType {
    pub fn new(data_type: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    #[must_use]
    pub fn with_precision(mut self, precision: i64, scale: i64) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    /// Positive length as u32, `None` for unbounded or unknown lengths.
    pub fn length(&self) -> Option<u32> {
        if self.max_length > 0 {
            u32::try_from(self.max_length).ok()
        } else {
            None
        }
    }
}

/// SQL syntax strategy for one database product.
pub trait Dialect: Send + Sync {
    /// Canonical dialect identifier (e.g. "postgres", "mysql").
    fn name(&self) -> &str;

    /// Quote an identifier (table name, column name, etc.).
    ///
    /// - PostgreSQL: `"identifier"`
    /// - MySQL: `` `identifier` ``
    fn quote_ident(&self, name: &str) -> Result<String>;

    /// Fully qualified table reference. Defaults to the quoted name.
    fn qualify(&self, table: &str) -> Result<String> {
        self.quote_ident(table)
    }

    /// Parameter placeholder for the given 1-based index.
    ///
    /// - PostgreSQL: `$1`, `$2`, etc.
    /// - MySQL: `?`
    fn param_placeholder(&self, index: usize) -> String;

    /// Native type name for a portable column type.
    fn render_type(&self, column_type: &ColumnType) -> Result<String>;

    /// Portable type for a native type reported by introspection.
    /// Unrecognised types map to [`ColumnType::Unknown`].
    fn map_native_type(&self, native: &NativeType) -> ColumnType;

    /// SQL literal for a value, used for column defaults.
    fn render_literal(&self, value: &SqlValue) -> String {
        default_literal(value)
    }

    /// SQL for a column default.
    fn render_default(&self, default: &DefaultValue) -> Result<String> {
        match default {
            DefaultValue::Literal(value) => Ok(self.render_literal(value)),
            DefaultValue::Expression(expr) => {
                validate_default_expression(expr)?;
                Ok(expr.clone())
            }
        }
    }

    /// Column definition inside CREATE TABLE.
    fn column_definition(&self, column: &ColumnSpec, inline_pk: bool) -> Result<String> {
        let mut def = format!(
            "{} {}",
            self.quote_ident(&column.name)?,
            self.render_type(&column.column_type)?
        );
        if !column.is_nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(ref default) = column.default {
            def.push_str(" DEFAULT ");
            def.push_str(&self.render_default(default)?);
        }
        if inline_pk {
            def.push_str(" PRIMARY KEY");
        }
        Ok(def)
    }

    /// CREATE TABLE for a schema definition (without secondary indexes).
    fn create_table(&self, schema: &TableSchema) -> Result<String> {
        let inline_key = schema
            .primary_key
            .as_ref()
            .filter(|pk| pk.is_inline())
            .and_then(|pk| pk.columns.first());

        let mut parts = Vec::with_capacity(schema.columns.len() + 1);
        for column in &schema.columns {
            let inline = inline_key.is_some_and(|k| *k == column.name);
            parts.push(self.column_definition(column, inline)?);
        }

        if let Some(pk) = schema.primary_key.as_ref().filter(|pk| !pk.is_inline()) {
            let cols = self.quote_list(&pk.columns)?;
            parts.push(format!("PRIMARY KEY ({})", cols));
        }

        Ok(format!(
            "CREATE TABLE {} ({})",
            self.qualify(&schema.name)?,
            parts.join(", ")
        ))
    }

    /// CREATE [UNIQUE] INDEX.
    fn create_index(&self, table: &str, index: &IndexSpec) -> Result<String> {
        Ok(format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote_ident(&index.name)?,
            self.qualify(table)?,
            self.quote_list(&index.columns)?
        ))
    }

    /// INSERT with one placeholder per column.
    fn insert(&self, table: &str, columns: &[&str]) -> Result<String> {
        let cols = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let params = (1..=columns.len())
            .map(|i| self.param_placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.qualify(table)?,
            cols,
            params
        ))
    }

    /// SELECT every row, ordered when an order is given.
    fn select_all(&self, table: &str, order_by: &[String]) -> Result<String> {
        let mut sql = format!("SELECT * FROM {}", self.qualify(table)?);
        if !order_by.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", self.quote_list(order_by)?));
        }
        Ok(sql)
    }

    /// Columns that give a table's pages a total order: the primary key,
    /// or every column when there is none.
    fn page_order(&self, schema: &TableSchema) -> Vec<String> {
        match schema.pk_columns() {
            [] => schema.columns.iter().map(|c| c.name.clone()).collect(),
            key => key.to_vec(),
        }
    }

    /// One page of rows using LIMIT/OFFSET. Separate pages only tile the
    /// table under a total order, so `order_by` must not be empty.
    fn select_page(
        &self,
        table: &str,
        order_by: &[String],
        offset: u64,
        limit: usize,
    ) -> Result<String> {
        if order_by.is_empty() {
            return Err(CopyError::Store(format!(
                "cannot page {} without an ORDER BY",
                table
            )));
        }
        let mut sql = self.select_all(table, order_by)?;
        sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
        Ok(sql)
    }

    /// SELECT the first row satisfying every condition of `filter`.
    ///
    /// NULL values become `IS NULL` and temporal windows become a pair of
    /// inclusive bounds. Placeholders follow [`RowFilter::bound_values`].
    fn select_matching(&self, table: &str, filter: &RowFilter) -> Result<String> {
        let conditions = filter.conditions();
        let mut rendered = Vec::with_capacity(conditions.len());
        let mut param = 0;
        for condition in &conditions {
            let col = self.quote_ident(condition.column())?;
            match condition {
                Condition::IsNull(_) => rendered.push(format!("{} IS NULL", col)),
                Condition::Equals(..) => {
                    param += 1;
                    rendered.push(format!("{} = {}", col, self.param_placeholder(param)));
                }
                Condition::Within { .. } => {
                    rendered.push(format!(
                        "{} >= {} AND {} <= {}",
                        col,
                        self.param_placeholder(param + 1),
                        col,
                        self.param_placeholder(param + 2)
                    ));
                    param += 2;
                }
            }
        }
        let mut sql = format!("SELECT * FROM {}", self.qualify(table)?);
        if !rendered.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&rendered.join(" AND "));
        }
        sql.push_str(" LIMIT 1");
        Ok(sql)
    }

    /// SELECT COUNT(*).
    fn count(&self, table: &str) -> Result<String> {
        Ok(format!("SELECT COUNT(*) FROM {}", self.qualify(table)?))
    }

    /// Comma-separated quoted identifiers.
    fn quote_list(&self, names: &[String]) -> Result<String> {
        Ok(names
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Result<Vec<_>>>()?
            .join(", "))
    }
}

/// Error for a type the dialect has no rendering for.
pub(crate) fn unrenderable(dialect: &str, column_type: &ColumnType) -> CopyError {
    CopyError::Store(format!(
        "{} dialect cannot render column type {}",
        dialect, column_type
    ))
}

/// Literal rendering shared by dialects that only override a few cases.
pub(crate) fn default_literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(true) => "TRUE".to_string(),
        SqlValue::Bool(false) => "FALSE".to_string(),
        SqlValue::I16(v) => v.to_string(),
        SqlValue::I32(v) => v.to_string(),
        SqlValue::I64(v) => v.to_string(),
        SqlValue::F32(v) => v.to_string(),
        SqlValue::F64(v) => v.to_string(),
        SqlValue::Decimal(v) => v.to_string(),
        SqlValue::Text(v) => quote_string(v),
        SqlValue::Bytes(v) => format!("X'{}'", hex(v)),
        SqlValue::Uuid(v) => quote_string(&v.to_string()),
        SqlValue::DateTime(v) => quote_string(&v.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        SqlValue::DateTimeOffset(v) => {
            quote_string(&v.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string())
        }
        SqlValue::Date(v) => quote_string(&v.format("%Y-%m-%d").to_string()),
        SqlValue::Time(v) => quote_string(&v.format("%H:%M:%S%.f").to_string()),
    }
}

/// Single-quoted SQL string literal.
pub(crate) fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_dialect_aliases() {
        assert_eq!(normalize_dialect("PostgreSQL"), "postgres");
        assert_eq!(normalize_dialect("pg"), "postgres");
        assert_eq!(normalize_dialect("mariadb"), "mysql");
        assert_eq!(normalize_dialect("MSAccess"), "access");
        assert_eq!(normalize_dialect("sqlite"), "sqlite");
    }

    #[test]
    fn test_native_type_length() {
        assert_eq!(NativeType::new("varchar").with_length(50).length(), Some(50));
        assert_eq!(NativeType::new("text").with_length(-1).length(), None);
        assert_eq!(NativeType::new("int").length(), None);
    }

    #[test]
    fn test_quote_string_escapes() {
        assert_eq!(quote_string("O'Brien"), "'O''Brien'");
    }
}
