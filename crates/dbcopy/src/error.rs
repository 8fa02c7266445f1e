//! Error types for the copy engine.
//!
//! Every failure is fatal to the run. The variants carry the table name and,
//! where there is one, the offending row or diff, so a failed run can be
//! diagnosed from its output alone.

use thiserror::Error;

use crate::core::value::Row;
use crate::verify::VerificationDiff;

/// Process exit codes, one per error category.
pub const EXIT_CONFIG_ERROR: u8 = 1;
pub const EXIT_CONNECTION_ERROR: u8 = 2;
pub const EXIT_SCHEMA_ERROR: u8 = 3;
pub const EXIT_DDL_ERROR: u8 = 4;
pub const EXIT_INSERT_ERROR: u8 = 5;
pub const EXIT_VERIFY_ERROR: u8 = 6;
pub const EXIT_IO_ERROR: u8 = 7;
pub const EXIT_DRIFT_ERROR: u8 = 8;
pub const EXIT_RUNTIME_ERROR: u8 = 9;

/// Main error type for copy operations.
#[derive(Error, Debug)]
pub enum CopyError {
    /// Configuration error (invalid YAML, bad URL, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A store could not be reached or failed its liveness check.
    #[error("Connection to {store} failed: {message}")]
    Connection { store: String, message: String },

    /// A column type could not be mapped and no hook corrected it.
    #[error("Schema translation failed for table {table}: {message}")]
    SchemaTranslation { table: String, message: String },

    /// The destination rejected generated DDL.
    #[error("DDL execution failed for table {table}: {message}")]
    DdlExecution { table: String, message: String },

    /// The destination rejected a row.
    #[error("Row insert failed for table {table}: {message}\n  Row: {row}")]
    RowInsert {
        table: String,
        row: String,
        message: String,
    },

    /// A source row has no exact-match counterpart in the destination.
    #[error("Verification failed for table {table}: no destination row matches {row}")]
    MissingRow { table: String, row: String },

    /// A destination row differs from its source row beyond tolerance.
    #[error("{0}")]
    VerificationMismatch(Box<VerificationDiff>),

    /// Bounded paging saw an empty page before reaching the captured row count.
    #[error(
        "Drift detected in table {table}: page at offset {offset} returned no rows \
         but {expected} rows were counted when the copy started"
    )]
    Drift {
        table: String,
        offset: u64,
        expected: u64,
    },

    /// A registered hook failed.
    #[error("Hook '{hook}' failed: {message}")]
    Hook { hook: String, message: String },

    /// Generic store failure outside the categories above.
    #[error("Store error: {0}")]
    Store(String),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// PostgreSQL driver error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// MySQL driver error
    #[cfg(feature = "mysql")]
    #[error("MySQL error: {0}")]
    MySql(#[from] sqlx::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CopyError {
    /// Create a Connection error for a store. The URL is redacted.
    pub fn connection(url: &str, message: impl std::fmt::Display) -> Self {
        CopyError::Connection {
            store: crate::config::redact_url(url),
            message: message.to_string(),
        }
    }

    /// Create a SchemaTranslation error
    pub fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        CopyError::SchemaTranslation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a DdlExecution error, keeping the store's message verbatim.
    pub fn ddl(table: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        CopyError::DdlExecution {
            table: table.into(),
            message: cause.to_string(),
        }
    }

    /// Create a RowInsert error
    pub fn row_insert(table: impl Into<String>, row: &Row, cause: impl std::fmt::Display) -> Self {
        CopyError::RowInsert {
            table: table.into(),
            row: row.to_string(),
            message: cause.to_string(),
        }
    }

    /// Create a MissingRow error
    pub fn missing_row(table: impl Into<String>, row: &Row) -> Self {
        CopyError::MissingRow {
            table: table.into(),
            row: row.to_string(),
        }
    }

    /// Create a Drift error
    pub fn drift(table: impl Into<String>, offset: u64, expected: u64) -> Self {
        CopyError::Drift {
            table: table.into(),
            offset,
            expected,
        }
    }

    /// Create a Hook error
    pub fn hook(hook: impl Into<String>, message: impl std::fmt::Display) -> Self {
        CopyError::Hook {
            hook: hook.into(),
            message: message.to_string(),
        }
    }

    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        CopyError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// True for errors raised by the verification phase.
    pub fn is_verification(&self) -> bool {
        matches!(
            self,
            CopyError::MissingRow { .. } | CopyError::VerificationMismatch(_)
        )
    }

    /// Exit code for the process when this error ends the run.
    pub fn exit_code(&self) -> u8 {
        match self {
            CopyError::Config(_) | CopyError::Yaml(_) | CopyError::Json(_) => EXIT_CONFIG_ERROR,
            CopyError::Connection { .. } => EXIT_CONNECTION_ERROR,
            CopyError::SchemaTranslation { .. } => EXIT_SCHEMA_ERROR,
            CopyError::DdlExecution { .. } => EXIT_DDL_ERROR,
            CopyError::RowInsert { .. } => EXIT_INSERT_ERROR,
            CopyError::MissingRow { .. } | CopyError::VerificationMismatch(_) => EXIT_VERIFY_ERROR,
            CopyError::Io(_) => EXIT_IO_ERROR,
            CopyError::Drift { .. } => EXIT_DRIFT_ERROR,
            _ => EXIT_RUNTIME_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for copy operations.
pub type Result<T> = std::result::Result<T, CopyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::SqlValue;

    #[test]
    fn test_exit_codes_are_distinct_per_category() {
        let row = Row::from(vec![("id".to_string(), SqlValue::I32(1))]);
        let errors = [
            CopyError::Config("bad".into()),
            CopyError::connection("postgres://localhost/db", "refused"),
            CopyError::schema("t", "unknown type"),
            CopyError::ddl("t", "syntax error"),
            CopyError::row_insert("t", &row, "duplicate key"),
            CopyError::missing_row("t", &row),
            CopyError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "x")),
            CopyError::drift("t", 6, 10),
        ];
        let mut codes: Vec<u8> = errors.iter().map(|e| e.exit_code()).collect();
        codes.dedup();
        assert_eq!(codes, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_row_insert_message_includes_table_and_row() {
        let row = Row::from(vec![
            ("id".to_string(), SqlValue::I32(7)),
            ("name".to_string(), SqlValue::Text("x".into())),
        ]);
        let msg = CopyError::row_insert("accounts", &row, "duplicate key").to_string();
        assert!(msg.contains("accounts"));
        assert!(msg.contains("duplicate key"));
        assert!(msg.contains("id: 7"));
    }

    #[test]
    fn test_connection_error_redacts_password() {
        let err = CopyError::connection("postgres://admin:hunter2@db:5432/app", "timeout");
        let msg = err.to_string();
        assert!(!msg.contains("hunter2"));
        assert!(msg.contains("db:5432/app"));
    }

    #[test]
    fn test_drift_message() {
        let msg = CopyError::drift("orders", 6, 10).to_string();
        assert!(msg.contains("orders"));
        assert!(msg.contains("offset 6"));
        assert!(msg.contains("10 rows"));
    }

    #[test]
    fn test_format_detailed_includes_cause_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "config.yaml missing");
        let detailed = CopyError::Io(io).format_detailed();
        assert!(detailed.starts_with("Error: IO error"));
        assert!(detailed.contains("Caused by:\n  1: config.yaml missing"));
    }
}
