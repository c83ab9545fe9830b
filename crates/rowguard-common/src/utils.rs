//! Utility functions for Rowguard

use std::sync::LazyLock;

/// Regex pattern for validating resource names, actions, fields and relations
static IDENTIFIER_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new("^[A-Za-z_][A-Za-z0-9_.:-]*$").expect("Invalid regex pattern")
});

/// Validate an identifier used in policies and model registration
///
/// Identifiers start with a letter or underscore and may contain
/// alphanumerics, underscore, dot, colon and hyphen.
///
/// # Examples
///
/// ```
/// use rowguard_common::is_valid_identifier;
///
/// assert!(is_valid_identifier("posts"));
/// assert!(is_valid_identifier("blog.post"));
/// assert!(!is_valid_identifier("1posts"));
/// assert!(!is_valid_identifier("with spaces"));
/// assert!(!is_valid_identifier(""));
/// ```
pub fn is_valid_identifier(s: &str) -> bool {
    IDENTIFIER_PATTERN.is_match(s)
}
