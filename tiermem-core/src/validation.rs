//! Validation Utilities

use crate::error::{Error, Result};

/// Longest accepted item key
pub const MAX_KEY_LEN: usize = 200;

/// Validate an item key
///
/// Keys name files inside a tier directory, so valid keys are:
/// - 1-200 characters
/// - Free of path separators and control characters
/// - Not dot-prefixed (reserved for the index and temp files)
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::validation("key cannot be empty"));
    }

    if key.chars().count() > MAX_KEY_LEN {
        return Err(Error::validation(format!(
            "key must be {} characters or less",
            MAX_KEY_LEN
        )));
    }

    if key.starts_with('.') {
        return Err(Error::validation(format!("key cannot start with '.': {}", key)));
    }

    for (i, c) in key.chars().enumerate() {
        if c == '/' || c == '\\' || c.is_control() {
            return Err(Error::validation(format!(
                "invalid character {:?} at position {} in key {}",
                c, i, key
            )));
        }
    }

    Ok(())
}

/// Key prefix of the record a working-memory session is merged into
pub const MERGED_PREFIX: &str = "merged_";

/// Longest accepted session id; `merged_<session>` must still be a valid key
pub const MAX_SESSION_ID_LEN: usize = MAX_KEY_LEN - MERGED_PREFIX.len();

/// Validate a working-memory session id
///
/// Session ids end up inside the merged record's key, so they follow the
/// key rules with room left for [`MERGED_PREFIX`].
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty() {
        return Err(Error::validation("session id cannot be empty"));
    }

    if session_id.chars().count() > MAX_SESSION_ID_LEN {
        return Err(Error::validation(format!(
            "session id must be {} characters or less",
            MAX_SESSION_ID_LEN
        )));
    }

    if let Some(c) = session_id.chars().find(|&c| c == '/' || c == '\\' || c.is_control()) {
        return Err(Error::validation(format!(
            "invalid character {:?} in session id {}",
            c, session_id
        )));
    }

    Ok(())
}

/// Validate a schema version string
///
/// Accepts Major.Minor or Major.Minor.Patch with no leading zeros.
pub fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() {
        return Err(Error::validation("version cannot be empty"));
    }

    let nums: Vec<&str> = version.split('.').collect();
    if nums.len() < 2 || nums.len() > 3 {
        return Err(Error::validation(format!(
            "version must be Major.Minor or Major.Minor.Patch: {}",
            version
        )));
    }

    for (i, num) in nums.iter().enumerate() {
        if num.is_empty() || !num.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::validation(format!(
                "invalid version component '{}' at position {}",
                num, i
            )));
        }

        // No leading zeros (except for "0" itself)
        if num.len() > 1 && num.starts_with('0') {
            return Err(Error::validation(format!(
                "version component cannot have leading zeros: '{}'",
                num
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key_valid() {
        assert!(validate_key("session-notes").is_ok());
        assert!(validate_key("merged_42").is_ok());
        assert!(validate_key("Interview 3 (draft)").is_ok());
        assert!(validate_key("a").is_ok());
    }

    #[test]
    fn test_validate_key_invalid() {
        assert!(validate_key("").is_err());
        assert!(validate_key(".index").is_err());
        assert!(validate_key("../escape").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key("a\\b").is_err());
        assert!(validate_key("line\nbreak").is_err());
        assert!(validate_key(&"k".repeat(MAX_KEY_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_session_id() {
        assert!(validate_session_id("interview-7").is_ok());
        assert!(validate_session_id(".hidden").is_ok());
        assert!(validate_session_id(&"s".repeat(MAX_SESSION_ID_LEN)).is_ok());
        assert!(validate_key(&format!("{}{}", MERGED_PREFIX, "s".repeat(MAX_SESSION_ID_LEN))).is_ok());

        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("team/alpha").is_err());
        assert!(validate_session_id("team\\alpha").is_err());
        assert!(validate_session_id("tab\there").is_err());
        assert!(validate_session_id(&"s".repeat(MAX_SESSION_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_version() {
        assert!(validate_version("1.0").is_ok());
        assert!(validate_version("2.1.3").is_ok());
        assert!(validate_version("1").is_err());
        assert!(validate_version("1.0.0.0").is_err());
        assert!(validate_version("01.0").is_err());
        assert!(validate_version("v1.0").is_err());
        assert!(validate_version("").is_err());
    }
}
