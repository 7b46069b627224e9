use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use crate::{error::SecretError, generate, validation};

/// Shared contract every secret store adapter must satisfy to plug into the
/// resolver: the local file-backed store and any remote implementations.
///
/// Calls are synchronous and blocking; the unit of concurrency this design
/// targets is independent OS processes sharing a file, not in-process tasks.
pub trait SecretStore: Send + Sync {
    fn store_name(&self) -> &str;

    /// Resolution order; lower values are consulted first.
    fn store_priority(&self) -> i32;

    fn store_available(&self) -> bool;

    fn store_read_only(&self) -> bool;

    /// Retrieve a secret, falling back to `default` when absent.
    fn get_secret(&self, key: &str, default: Option<&str>)
        -> Result<Option<String>, SecretError>;

    /// Store a secret, overwriting any existing value under the same key.
    fn set_secret(&self, key: &str, value: &str) -> Result<(), SecretError>;

    /// Remove a secret. Deleting an absent key is a no-op, not an error.
    fn delete_secret(&self, key: &str) -> Result<(), SecretError>;

    /// Generate a cryptographically secure random secret of `length`
    /// characters, store it under `name`, and return it.
    fn create_secret(&self, name: &str, length: usize) -> Result<String, SecretError> {
        validation::validate_secret_key(name)?;
        let secret = generate::generate_secret(length)?;
        self.set_secret(name, &secret)?;
        Ok(secret)
    }
}

/// In-memory store used by resolver tests and as a stand-in adapter in smoke
/// runs. Not encrypted; production deployments use the file-backed store.
pub struct MemorySecretStore {
    name: String,
    priority: i32,
    available: bool,
    read_only: bool,
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            priority,
            available: true,
            read_only: false,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, SecretError> {
        self.entries
            .lock()
            .map_err(|err| SecretError::storage(format!("lock poisoned: {err}")))
    }
}

impl SecretStore for MemorySecretStore {
    fn store_name(&self) -> &str {
        &self.name
    }

    fn store_priority(&self) -> i32 {
        self.priority
    }

    fn store_available(&self) -> bool {
        self.available
    }

    fn store_read_only(&self) -> bool {
        self.read_only
    }

    fn get_secret(
        &self,
        key: &str,
        default: Option<&str>,
    ) -> Result<Option<String>, SecretError> {
        validation::validate_secret_key(key)?;
        let entries = self.entries()?;
        Ok(entries
            .get(key)
            .cloned()
            .or_else(|| default.map(String::from)))
    }

    fn set_secret(&self, key: &str, value: &str) -> Result<(), SecretError> {
        validation::validate_secret_key(key)?;
        validation::validate_secret_value(value)?;
        if self.read_only {
            return Err(SecretError::ReadOnly {
                store: self.name.clone(),
            });
        }
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete_secret(&self, key: &str) -> Result<(), SecretError> {
        validation::validate_secret_key(key)?;
        if self.read_only {
            return Err(SecretError::ReadOnly {
                store: self.name.clone(),
            });
        }
        self.entries()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_and_default() {
        let store = MemorySecretStore::new("mem", 0);
        store.set_secret("db/password", "s3cret").expect("set");
        assert_eq!(
            store.get_secret("db/password", None).expect("get"),
            Some("s3cret".to_string())
        );
        assert_eq!(
            store.get_secret("missing", Some("fallback")).expect("get"),
            Some("fallback".to_string())
        );
    }

    #[test]
    fn delete_is_idempotent() {
        let store = MemorySecretStore::new("mem", 0);
        store.set_secret("k", "v").expect("set");
        store.delete_secret("k").expect("delete");
        store.delete_secret("k").expect("delete again");
        assert_eq!(store.get_secret("k", None).expect("get"), None);
    }

    #[test]
    fn read_only_store_rejects_writes() {
        let store = MemorySecretStore::new("mem", 0).read_only();
        let err = store.set_secret("k", "v").expect_err("should reject");
        assert!(matches!(err, SecretError::ReadOnly { .. }));
    }

    #[test]
    fn create_secret_stores_generated_value() {
        let store = MemorySecretStore::new("mem", 0);
        let generated = store.create_secret("api_key", 24).expect("create");
        assert_eq!(generated.len(), 24);
        assert_eq!(
            store.get_secret("api_key", None).expect("get"),
            Some(generated)
        );
    }
}
