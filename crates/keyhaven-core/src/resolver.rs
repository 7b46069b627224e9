//! Priority-ordered multiplexing across secret store adapters.

use tracing::{debug, warn};

use crate::{error::SecretError, store::SecretStore};

/// Unifies one or more local stores and any remote adapters behind a single
/// lookup surface. Stores are consulted in ascending priority order; writes
/// target exactly one store and are never broadcast.
///
/// The adapter set is fixed at construction from configuration; availability
/// is the only attribute that changes over a store's lifetime.
pub struct SecretResolver {
    stores: Vec<Box<dyn SecretStore>>,
    default_write_store: Option<String>,
}

impl SecretResolver {
    pub fn new(mut stores: Vec<Box<dyn SecretStore>>) -> Self {
        stores.sort_by_key(|s| s.store_priority());
        Self {
            stores,
            default_write_store: None,
        }
    }

    /// Name the store mutations fall back to when no store is named.
    pub fn with_default_write_store(mut self, name: impl Into<String>) -> Self {
        self.default_write_store = Some(name.into());
        self
    }

    pub fn store_names(&self) -> Vec<&str> {
        self.stores.iter().map(|s| s.store_name()).collect()
    }

    pub fn store(&self, name: &str) -> Option<&dyn SecretStore> {
        self.stores
            .iter()
            .find(|s| s.store_name() == name)
            .map(|s| s.as_ref())
    }

    /// Retrieve a secret. With `store_name` set only that store is queried
    /// and its unavailability is an error; otherwise stores are tried in
    /// priority order, skipping unavailable ones, and `default` is returned
    /// on a full miss. A `store.key` prefix matching a store name routes to
    /// that store.
    pub fn get_secret(
        &self,
        key: &str,
        store_name: Option<&str>,
        default: Option<&str>,
    ) -> Result<Option<String>, SecretError> {
        let (target, key) = match store_name {
            Some(name) => (Some(name), key),
            None => self.split_routed_key(key),
        };

        if let Some(name) = target {
            let store = self.named_store(name)?;
            let value = store.get_secret(key, None)?;
            return Ok(value.or_else(|| default.map(String::from)));
        }

        for store in &self.stores {
            if !store.store_available() {
                debug!(store = store.store_name(), "skipping unavailable store");
                continue;
            }
            if let Some(value) = store.get_secret(key, None)? {
                return Ok(Some(value));
            }
        }

        debug!("secret not found in any store, returning default");
        Ok(default.map(String::from))
    }

    /// Store a secret in the named store, or the default writable store.
    pub fn set_secret(
        &self,
        key: &str,
        value: &str,
        store_name: Option<&str>,
    ) -> Result<(), SecretError> {
        self.write_target(store_name)?.set_secret(key, value)
    }

    /// Delete a secret from the named store, or the default writable store.
    pub fn delete_secret(&self, key: &str, store_name: Option<&str>) -> Result<(), SecretError> {
        self.write_target(store_name)?.delete_secret(key)
    }

    /// Generate and store a secret in the named or default writable store.
    pub fn create_secret(
        &self,
        name: &str,
        length: usize,
        store_name: Option<&str>,
    ) -> Result<String, SecretError> {
        self.write_target(store_name)?.create_secret(name, length)
    }

    fn named_store(&self, name: &str) -> Result<&dyn SecretStore, SecretError> {
        let store = self.store(name).ok_or_else(|| SecretError::Unavailable {
            store: name.to_string(),
        })?;
        if !store.store_available() {
            warn!(store = name, "explicitly named store is not available");
            return Err(SecretError::Unavailable {
                store: name.to_string(),
            });
        }
        Ok(store)
    }

    /// Writes always target one explicitly designated store; there is no
    /// fallback scan, so an unconfigured default surfaces as an error rather
    /// than a write landing in whichever store happens to sort first.
    fn write_target(&self, store_name: Option<&str>) -> Result<&dyn SecretStore, SecretError> {
        let name = store_name
            .or(self.default_write_store.as_deref())
            .ok_or_else(|| SecretError::storage("no default write store configured"))?;
        let store = self.named_store(name)?;
        if store.store_read_only() {
            return Err(SecretError::ReadOnly {
                store: name.to_string(),
            });
        }
        Ok(store)
    }

    /// Split a `store.key` form when the prefix names a known store.
    fn split_routed_key<'a>(&self, key: &'a str) -> (Option<&'a str>, &'a str) {
        if let Some((prefix, rest)) = key.split_once('.') {
            if !rest.is_empty() && self.stores.iter().any(|s| s.store_name() == prefix) {
                return (Some(prefix), rest);
            }
        }
        (None, key)
    }
}
