//! Identifier validation and quoting.
//!
//! Table and column names come from source introspection and end up in
//! generated SQL. Identifiers cannot be bound as parameters, so they are
//! validated and quoted here, and raw default expressions copied from a
//! source are screened before they are spliced into CREATE TABLE.

use crate::error::{CopyError, Result};

/// Maximum identifier length (conservative limit across databases).
/// - PostgreSQL: 63 bytes
/// - MySQL: 64 characters
/// - Access: 64 characters
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier.
///
/// Rejects empty identifiers, identifiers containing null bytes, and
/// identifiers exceeding the maximum length.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CopyError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(CopyError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(CopyError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier with double quotes, doubling embedded quotes.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a MySQL identifier with backticks, doubling embedded backticks.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Qualify a PostgreSQL table name with its schema.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// Screen a raw default expression copied from a source column.
///
/// Defaults are single expressions such as `CURRENT_TIMESTAMP` or
/// `nextval('seq')`. Statement separators and comment markers are rejected.
pub fn validate_default_expression(expr: &str) -> Result<()> {
    if expr.contains(';') {
        return Err(CopyError::Config(format!(
            "SECURITY: Default expression contains semicolon (possible injection): {:?}",
            expr
        )));
    }

    if expr.contains("--") || expr.contains("/*") || expr.contains("*/") {
        return Err(CopyError::Config(format!(
            "SECURITY: Default expression contains SQL comment markers (possible injection): {:?}",
            expr
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("my_table").is_ok());
        assert!(validate_identifier("Table 123").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_bad_names() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("bad\0name").is_err());
        assert!(validate_identifier(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_quote_pg() {
        assert_eq!(quote_pg("users").unwrap(), "\"users\"");
        assert_eq!(quote_pg("table\"name").unwrap(), "\"table\"\"name\"");
    }

    #[test]
    fn test_quote_mysql() {
        assert_eq!(quote_mysql("users").unwrap(), "`users`");
        assert_eq!(quote_mysql("table`name").unwrap(), "`table``name`");
    }

    #[test]
    fn test_qualify_pg() {
        assert_eq!(
            qualify_pg("public", "accounts").unwrap(),
            "\"public\".\"accounts\""
        );
    }

    #[test]
    fn test_default_expression_screening() {
        assert!(validate_default_expression("CURRENT_TIMESTAMP").is_ok());
        assert!(validate_default_expression("nextval('accounts_id_seq'::regclass)").is_ok());
        assert!(validate_default_expression("0; DROP TABLE users").is_err());
        assert!(validate_default_expression("1 -- trailing").is_err());
    }
}
