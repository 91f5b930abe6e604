//! Input validation primitives.
//!
//! These replace verbose ok_or_else + Error::validation_invalid_argument chains.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Require a string to be non-empty after trimming.
///
/// Returns a reference to the trimmed string on success.
pub fn require_non_empty<'a>(value: &'a str, field: &str, message: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::validation_invalid_argument(field, message, None, None))
    } else {
        Ok(trimmed)
    }
}

static SLUG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").unwrap());

/// Require a short identifier safe to embed in file names (`dev`, `prod-eu`).
pub fn require_slug<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let value = require_non_empty(value, field, "Value cannot be empty")?;
    if SLUG_PATTERN.is_match(value) {
        Ok(value)
    } else {
        Err(Error::validation_invalid_argument(
            field,
            format!(
                "'{}' must start with a letter or digit and contain only letters, digits, '-' or '_'",
                value
            ),
            Some(value.to_string()),
            None,
        ))
    }
}
