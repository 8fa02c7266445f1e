//! Column default parsing for introspected schemas.
//!
//! Information schemas report defaults as SQL text. Constants are turned into
//! [`DefaultValue::Literal`] so each destination dialect can render them its
//! own way; everything else is kept as an expression.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::core::schema::DefaultValue;
use crate::core::value::SqlValue;

/// Parse a reported column default.
///
/// Handles quoted strings (with `''` escapes), PostgreSQL `::type` casts,
/// booleans, integers and decimals. Returns `None` for a NULL default and for
/// sequence defaults (`nextval(...)`), which only make sense in the source.
pub fn parse_default(raw: &str) -> Option<DefaultValue> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
        return None;
    }
    if raw.to_ascii_lowercase().starts_with("nextval(") {
        return None;
    }

    if raw.starts_with('\'') {
        return match quoted_literal(raw) {
            Some(text) => Some(DefaultValue::Literal(SqlValue::Text(text))),
            None => Some(DefaultValue::Expression(raw.to_string())),
        };
    }

    let bare = strip_cast(raw);
    let unwrapped = bare
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(bare);

    if unwrapped.eq_ignore_ascii_case("null") {
        return None;
    }
    if unwrapped.eq_ignore_ascii_case("true") {
        return Some(DefaultValue::Literal(SqlValue::Bool(true)));
    }
    if unwrapped.eq_ignore_ascii_case("false") {
        return Some(DefaultValue::Literal(SqlValue::Bool(false)));
    }
    if let Ok(n) = unwrapped.parse::<i64>() {
        return Some(DefaultValue::Literal(SqlValue::I64(n)));
    }
    if let Ok(d) = Decimal::from_str(unwrapped) {
        return Some(DefaultValue::Literal(SqlValue::Decimal(d)));
    }

    Some(DefaultValue::Expression(raw.to_string()))
}

/// Contents of a leading single-quoted literal, if the rest of the text is
/// only a cast.
fn quoted_literal(raw: &str) -> Option<String> {
    let mut text = String::new();
    let mut chars = raw.char_indices().skip(1).peekable();
    while let Some((i, c)) = chars.next() {
        if c == '\'' {
            if matches!(chars.peek(), Some((_, '\''))) {
                chars.next();
                text.push('\'');
                continue;
            }
            let rest = raw[i + 1..].trim();
            return (rest.is_empty() || rest.starts_with("::")).then_some(text);
        }
        text.push(c);
    }
    None
}

fn strip_cast(raw: &str) -> &str {
    match raw.find("::") {
        Some(pos) => raw[..pos].trim(),
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(v: impl Into<SqlValue>) -> Option<DefaultValue> {
        Some(DefaultValue::Literal(v.into()))
    }

    #[test]
    fn test_postgres_forms() {
        assert_eq!(parse_default("'active'::character varying"), literal("active"));
        assert_eq!(parse_default("'O''Brien'::text"), literal("O'Brien"));
        assert_eq!(parse_default("0"), literal(0i64));
        assert_eq!(parse_default("'0'::numeric"), literal("0"));
        assert_eq!(parse_default("(-1)"), literal(-1i64));
        assert_eq!(parse_default("true"), literal(true));
        assert_eq!(parse_default("12.50"), literal(Decimal::new(1250, 2)));
        assert_eq!(
            parse_default("now()"),
            Some(DefaultValue::Expression("now()".into()))
        );
    }

    #[test]
    fn test_sequences_and_null_are_dropped() {
        assert_eq!(parse_default("nextval('accounts_id_seq'::regclass)"), None);
        assert_eq!(parse_default("NULL::character varying"), None);
        assert_eq!(parse_default("NULL"), None);
        assert_eq!(parse_default("  "), None);
    }

    #[test]
    fn test_mysql_expression() {
        assert_eq!(
            parse_default("CURRENT_TIMESTAMP"),
            Some(DefaultValue::Expression("CURRENT_TIMESTAMP".into()))
        );
    }
}
