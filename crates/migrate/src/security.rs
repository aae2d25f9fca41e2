//! Identifier safety for generated SQL
//!
//! Table names reach the existence check and the history statements as
//! interpolated text rather than bound parameters, so they are validated here
//! before any SQL is produced.

use crate::error::{MigrateError, MigrateResult};

/// Validate that an identifier is safe to interpolate into SQL
///
/// Accepts ASCII letters, digits and underscores, not starting with a digit,
/// at most `max_len` bytes long.
pub fn validate_identifier(identifier: &str, max_len: usize) -> MigrateResult<()> {
    let reject = |reason: String| MigrateError::InvalidIdentifier {
        identifier: identifier.to_string(),
        reason,
    };

    let first = match identifier.chars().next() {
        Some(c) => c,
        None => return Err(reject("identifier cannot be empty".to_string())),
    };

    if identifier.len() > max_len {
        return Err(reject(format!("too long (max {} characters)", max_len)));
    }

    if let Some(c) = identifier
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
    {
        return Err(reject(format!("contains invalid character '{}'", c)));
    }

    if first.is_ascii_digit() {
        return Err(reject("cannot start with a number".to_string()));
    }

    Ok(())
}

/// Wrap an identifier in the given quote character, doubling embedded quotes
pub fn quote_identifier(identifier: &str, quote: char) -> String {
    let doubled: String = [quote, quote].iter().collect();
    let escaped = identifier.replace(quote, &doubled);
    format!("{quote}{escaped}{quote}")
}

/// Escape a string literal body by doubling single quotes
pub fn escape_string(value: &str) -> String {
    value.replace('\'', "''")
}
