//! Schema definition types: columns, primary keys and indexes.
//!
//! A [`TableSchema`] is introspected from the source, amended by hooks, and
//! rendered to destination DDL by a dialect. It never carries SQL text of its
//! own; rendering is entirely the dialect's job.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::SqlValue;

/// Portable semantic column type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    /// Single-precision float.
    Float,
    /// Double-precision float.
    Double,
    Decimal {
        precision: u32,
        scale: u32,
    },
    /// Variable-length string. `None` means unbounded.
    String {
        size: Option<u32>,
    },
    FixedString {
        size: u32,
    },
    Text,
    Binary {
        size: Option<u32>,
    },
    Date,
    Time,
    DateTime,
    DateTimeTz,
    Uuid,
    Json,
    /// A native type no dialect mapping recognised. Must be corrected by a
    /// hook before the schema can be rendered.
    Unknown(String),
}

impl ColumnType {
    /// True for string-like types that carry a size.
    pub fn is_sized_string(&self) -> bool {
        matches!(
            self,
            ColumnType::String { size: Some(_) } | ColumnType::FixedString { .. }
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            ColumnType::Date | ColumnType::Time | ColumnType::DateTime | ColumnType::DateTimeTz
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Boolean => write!(f, "boolean"),
            ColumnType::SmallInt => write!(f, "smallint"),
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::BigInt => write!(f, "bigint"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::Double => write!(f, "double"),
            ColumnType::Decimal { precision, scale } => {
                write!(f, "decimal({},{})", precision, scale)
            }
            ColumnType::String { size: Some(n) } => write!(f, "string({})", n),
            ColumnType::String { size: None } => write!(f, "string"),
            ColumnType::FixedString { size } => write!(f, "char({})", size),
            ColumnType::Text => write!(f, "text"),
            ColumnType::Binary { size: Some(n) } => write!(f, "binary({})", n),
            ColumnType::Binary { size: None } => write!(f, "binary"),
            ColumnType::Date => write!(f, "date"),
            ColumnType::Time => write!(f, "time"),
            ColumnType::DateTime => write!(f, "datetime"),
            ColumnType::DateTimeTz => write!(f, "datetimetz"),
            ColumnType::Uuid => write!(f, "uuid"),
            ColumnType::Json => write!(f, "json"),
            ColumnType::Unknown(native) => write!(f, "unknown({})", native),
        }
    }
}

/// Column default.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// A constant value, rendered as a literal by the dialect.
    Literal(SqlValue),
    /// A raw SQL expression copied from the source (e.g. `CURRENT_TIMESTAMP`).
    Expression(String),
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,

    /// Portable type.
    pub column_type: ColumnType,

    /// Whether the column allows NULL values.
    pub is_nullable: bool,

    /// Whether the column is part of the primary key.
    pub is_primary_key: bool,

    /// Column default, if any.
    pub default: Option<DefaultValue>,

    /// Native type name as reported by the source, kept for diagnostics.
    pub native_type: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            is_nullable: true,
            is_primary_key: false,
            default: None,
            native_type: None,
        }
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_nullable = false;
        self
    }

    #[must_use]
    pub fn default_value(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }
}

/// How a primary key is declared in CREATE TABLE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PrimaryKeyStyle {
    /// `id integer PRIMARY KEY` on the column itself (single-column keys only).
    #[default]
    Inline,
    /// A separate `PRIMARY KEY (...)` table constraint.
    Constraint,
}

/// Primary key metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKey {
    pub columns: Vec<String>,
    pub style: PrimaryKeyStyle,
}

impl PrimaryKey {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            style: PrimaryKeyStyle::Inline,
        }
    }

    /// The key is rendered inline only when it has exactly one column and
    /// nothing asked for a standalone constraint.
    pub fn is_inline(&self) -> bool {
        self.style == PrimaryKeyStyle::Inline && self.columns.len() == 1
    }
}

/// Index metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name.
    pub name: String,

    /// Index columns, in key order.
    pub columns: Vec<String>,

    /// Whether this is a unique index.
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, columns: Vec<String>, unique: bool) -> Self {
        Self {
            name: name.into(),
            columns,
            unique,
        }
    }
}

/// Schema definition for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    /// Table name.
    pub name: String,

    /// Columns in ordinal order.
    pub columns: Vec<ColumnSpec>,

    /// Primary key, if the table has one.
    pub primary_key: Option<PrimaryKey>,

    /// Secondary indexes.
    pub indexes: Vec<IndexSpec>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
            indexes: Vec::new(),
        }
    }

    /// Add a column. Primary-key columns are collected into the primary key
    /// in the order they are added.
    #[must_use]
    pub fn column(mut self, column: ColumnSpec) -> Self {
        if column.is_primary_key {
            match self.primary_key.as_mut() {
                Some(pk) => pk.columns.push(column.name.clone()),
                None => self.primary_key = Some(PrimaryKey::new(vec![column.name.clone()])),
            }
        }
        self.columns.push(column);
        self
    }

    #[must_use]
    pub fn index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    /// Look up a column by name.
    pub fn get_column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Mutable column lookup.
    pub fn get_column_mut(&mut self, name: &str) -> Option<&mut ColumnSpec> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Primary key column names, empty when the table has no key.
    pub fn pk_columns(&self) -> &[String] {
        self.primary_key
            .as_ref()
            .map(|pk| pk.columns.as_slice())
            .unwrap_or(&[])
    }

    /// Check that the definition can be rendered: no unmapped types, and
    /// every key and index column exists.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.columns.is_empty() {
            return Err("table has no columns".into());
        }
        for col in &self.columns {
            if let ColumnType::Unknown(native) = &col.column_type {
                return Err(format!(
                    "column {} has unmapped type '{}'",
                    col.name, native
                ));
            }
        }
        for key_col in self.pk_columns() {
            if self.get_column(key_col).is_none() {
                return Err(format!("primary key column {} does not exist", key_col));
            }
        }
        for index in &self.indexes {
            for col in &index.columns {
                if self.get_column(col).is_none() {
                    return Err(format!(
                        "index {} references missing column {}",
                        index.name, col
                    ));
                }
            }
        }
        Ok(())
    }
}
