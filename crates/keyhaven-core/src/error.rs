use thiserror::Error;

/// Errors produced by secret stores and the resolver.
///
/// Integrity failures are deliberately a distinct variant so callers can tell
/// "wrong password or tampered file" apart from "not found" or "timed out".
#[derive(Debug, Error)]
pub enum SecretError {
    /// Secret key or value failed input validation.
    #[error("validation failed: {reason}")]
    Validation { reason: String },
    /// Authentication of the keystore blob failed. Terminal; the store never
    /// recovers from this by recreating or ignoring the file.
    #[error("keystore integrity check failed: {reason}")]
    Integrity { reason: String },
    /// Exclusive lock on the keystore could not be acquired in time. The
    /// caller may retry; the guard itself does not.
    #[error("could not lock {path} within {timeout_secs}s")]
    LockTimeout { path: String, timeout_secs: u64 },
    /// Write attempted against a read-only store.
    #[error("store {store} is read-only")]
    ReadOnly { store: String },
    /// The explicitly named store is not reachable.
    #[error("store {store} is not available")]
    Unavailable { store: String },
    /// Underlying I/O or serialization failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

impl SecretError {
    pub fn storage<E: ToString>(err: E) -> Self {
        SecretError::Storage {
            reason: err.to_string(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        SecretError::Validation {
            reason: reason.into(),
        }
    }

    pub fn integrity(reason: impl Into<String>) -> Self {
        SecretError::Integrity {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_is_distinct_from_storage() {
        let err = SecretError::integrity("bad tag");
        assert!(matches!(err, SecretError::Integrity { .. }));
        assert_eq!(err.to_string(), "keystore integrity check failed: bad tag");

        let err = SecretError::storage(std::io::Error::other("disk full"));
        assert!(matches!(err, SecretError::Storage { .. }));
    }
}
