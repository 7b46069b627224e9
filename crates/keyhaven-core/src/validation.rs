//! Input validation for secret keys and values, shared by every store
//! adapter so local and remote stores enforce the same rules.

use crate::error::SecretError;

pub const MAX_KEY_LEN: usize = 255;
pub const MAX_VALUE_BYTES: usize = 64 * 1024;

/// Device names Windows reserves regardless of extension.
const RESERVED_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Validate a secret key: 1-255 chars from `[A-Za-z0-9._/-]`, no path
/// traversal, no reserved device names.
pub fn validate_secret_key(key: &str) -> Result<(), SecretError> {
    if key.is_empty() || key.chars().all(char::is_whitespace) {
        return Err(SecretError::validation("secret key cannot be empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(SecretError::validation(format!(
            "secret key too long (max {MAX_KEY_LEN} chars)"
        )));
    }
    if key.contains("..") {
        return Err(SecretError::validation(
            "path traversal detected in secret key",
        ));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-'))
    {
        return Err(SecretError::validation(
            "secret key may only contain [A-Za-z0-9._/-]",
        ));
    }
    if RESERVED_NAMES.contains(&key.to_ascii_lowercase().as_str()) {
        return Err(SecretError::validation("reserved key name not allowed"));
    }
    Ok(())
}

/// Validate a secret value: non-empty, at most 64 KiB of UTF-8.
pub fn validate_secret_value(value: &str) -> Result<(), SecretError> {
    if value.is_empty() {
        return Err(SecretError::validation("secret value cannot be empty"));
    }
    if value.len() > MAX_VALUE_BYTES {
        return Err(SecretError::validation(format!(
            "secret value too large (max {MAX_VALUE_BYTES} bytes)"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_keys() {
        for key in ["db_pwd", "app/api-key", "service.token", "a", "A9"] {
            validate_secret_key(key).expect("key should be valid");
        }
    }

    #[test]
    fn rejects_empty_and_whitespace() {
        assert!(validate_secret_key("").is_err());
        assert!(validate_secret_key("   ").is_err());
    }

    #[test]
    fn rejects_traversal_and_bad_chars() {
        assert!(validate_secret_key("../etc/passwd").is_err());
        assert!(validate_secret_key("a/../b").is_err());
        assert!(validate_secret_key("has space").is_err());
        assert!(validate_secret_key("semi;colon").is_err());
    }

    #[test]
    fn rejects_oversized_key() {
        let key = "k".repeat(MAX_KEY_LEN + 1);
        assert!(validate_secret_key(&key).is_err());
        let key = "k".repeat(MAX_KEY_LEN);
        assert!(validate_secret_key(&key).is_ok());
    }

    #[test]
    fn rejects_reserved_names() {
        assert!(validate_secret_key("con").is_err());
        assert!(validate_secret_key("COM1").is_err());
        assert!(validate_secret_key("console").is_ok());
    }

    #[test]
    fn value_bounds() {
        assert!(validate_secret_value("").is_err());
        assert!(validate_secret_value("v").is_ok());
        assert!(validate_secret_value(&"v".repeat(MAX_VALUE_BYTES)).is_ok());
        assert!(validate_secret_value(&"v".repeat(MAX_VALUE_BYTES + 1)).is_err());
    }
}
