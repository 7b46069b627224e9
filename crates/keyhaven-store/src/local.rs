//! The file-backed `SecretStore` implementation composing the fingerprint,
//! derivation, codec, lock, and migration layers.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use keyhaven_core::{validation, SecretError, SecretStore};
use tracing::{debug, error, info, warn};

use crate::{
    codec::{self, FormatVersion, Payload, SecretEntry, SALT_LEN},
    derive::{self, KeyRecipe},
    fingerprint::Fingerprint,
    import,
    lockfile::{self, StoreLock},
    migrate::{self, MigrationOutcome, StorePaths},
};

const PROBE_KEY: &str = "sstore_probe";

/// Construction parameters for a local store. Environment-backed fields
/// (container mode, container password, lock timeout) default from the
/// recognized variables but can be set explicitly, which tests rely on.
pub struct StoreOptions {
    pub store_name: String,
    pub priority: i32,
    pub directory: PathBuf,
    pub app_short_name: String,
    /// CLI-provided password mixed into the machine derivation, or used
    /// alone when `user_override` is set.
    pub custom_password: Option<String>,
    pub user_override: bool,
    pub container_mode: bool,
    pub container_password: Option<String>,
    pub lock_timeout: Duration,
    /// Injectable for tests simulating a specific machine.
    pub fingerprint: Option<Fingerprint>,
    pub read_only: bool,
}

impl StoreOptions {
    pub fn new(
        store_name: impl Into<String>,
        directory: impl Into<PathBuf>,
        app_short_name: impl Into<String>,
    ) -> Self {
        Self {
            store_name: store_name.into(),
            priority: 0,
            directory: directory.into(),
            app_short_name: app_short_name.into(),
            custom_password: None,
            user_override: false,
            container_mode: derive::container_mode_from_env(),
            container_password: derive::container_password_from_env(),
            lock_timeout: lockfile::lock_timeout_from_env(),
            fingerprint: None,
            read_only: false,
        }
    }
}

/// Encrypted, file-backed secret store shared safely between processes via
/// the sidecar lock and atomic replacement.
///
/// The lock serializes whole read-modify-write cycles, so the file is never
/// torn; two concurrent cycles updating the *same* key keep last-writer-wins
/// semantics by design.
pub struct LocalSecretStore {
    name: String,
    priority: i32,
    paths: StorePaths,
    recipe: KeyRecipe,
    active: FormatVersion,
    lock_timeout: Duration,
    migration: MigrationOutcome,
    available: bool,
    read_only: bool,
}

impl std::fmt::Debug for LocalSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Manual impl: `recipe` holds password material and must never be
        // printed, so it is redacted instead of derived.
        f.debug_struct("LocalSecretStore")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("paths", &self.paths)
            .field("recipe", &"<redacted>")
            .field("active", &self.active)
            .field("lock_timeout", &self.lock_timeout)
            .field("migration", &self.migration)
            .field("available", &self.available)
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl LocalSecretStore {
    /// Open (or create on first write) the store for `options`. Runs the
    /// migration engine, a writability probe, and any pending bulk import.
    ///
    /// Fails with `Integrity` when an existing current-format file does not
    /// authenticate under the derived key — wrong password or tampering is
    /// surfaced here rather than silently recreating the store.
    pub fn open(mut options: StoreOptions) -> Result<Self, SecretError> {
        let directory = options.directory.clone();
        let paths = StorePaths::new(&options.directory, &options.app_short_name);
        let fingerprint = options
            .fingerprint
            .take()
            .unwrap_or_else(Fingerprint::collect);
        let machine_id = fingerprint
            .machine_id()
            .unwrap_or("unknown-machine")
            .to_string();

        let current = Self::current_recipe(&options, fingerprint, &paths);
        let legacy = KeyRecipe::LegacyV2 {
            machine_id,
            keystore_path: paths.v2.clone(),
        };

        let migration = {
            let _lock = StoreLock::acquire(&paths.v3, options.lock_timeout)?;
            migrate::ensure_current(&paths, &current, &legacy)
        };

        let (active, recipe) = match &migration {
            MigrationOutcome::FellBack { reason } => {
                warn!(store = options.store_name.as_str(), %reason, "serving legacy v2 keystore");
                (FormatVersion::V2, legacy)
            }
            _ => (FormatVersion::V3, current),
        };

        let mut store = Self {
            name: options.store_name,
            priority: options.priority,
            paths,
            recipe,
            active,
            lock_timeout: options.lock_timeout,
            migration,
            available: true,
            read_only: options.read_only,
        };

        // Authenticate an existing current-format file up front so a wrong
        // password fails the open, not some later read.
        if store.active == FormatVersion::V3 && store.active_path().exists() {
            let _lock = StoreLock::acquire(&store.paths.v3, store.lock_timeout)?;
            store.load_locked()?;
        }

        if !store.read_only {
            store.read_only = !store.probe_writable();
        }
        info!(
            store = store.name.as_str(),
            path = %store.active_path().display(),
            read_only = store.read_only,
            "opened local secrets store"
        );

        if !store.read_only {
            match import::run_auto_import(&store, &directory) {
                Ok(Some(summary)) => info!(
                    imported = summary.imported,
                    failed = summary.failed,
                    "bulk secret import complete"
                ),
                Ok(None) => {}
                Err(err) => error!("bulk secret import failed: {err}"),
            }
        }

        Ok(store)
    }

    fn current_recipe(
        options: &StoreOptions,
        fingerprint: Fingerprint,
        paths: &StorePaths,
    ) -> KeyRecipe {
        if options.container_mode {
            if let Some(password) = &options.container_password {
                debug!("container mode: using environment password without fingerprint mixing");
                return KeyRecipe::Direct {
                    password: password.clone(),
                };
            }
            debug!("container mode set but no environment password found");
        }
        if options.user_override {
            if let Some(password) = &options.custom_password {
                debug!("using user-provided password without system strengthening");
                return KeyRecipe::Direct {
                    password: password.clone(),
                };
            }
        }
        KeyRecipe::Machine {
            fingerprint,
            app_name: options.app_short_name.clone(),
            keystore_path: paths.v3.clone(),
            custom_password: options.custom_password.clone(),
        }
    }

    /// How the migration engine classified this store at open.
    pub fn migration_outcome(&self) -> &MigrationOutcome {
        &self.migration
    }

    /// Path of the file currently being served (v3, or v2 after fallback).
    pub fn active_path(&self) -> &Path {
        match self.active {
            FormatVersion::V3 => &self.paths.v3,
            FormatVersion::V2 => &self.paths.v2,
        }
    }

    fn lock(&self) -> Result<StoreLock, SecretError> {
        StoreLock::acquire(&self.paths.v3, self.lock_timeout)
    }

    /// Load the payload and its persisted salt. Caller must hold the lock.
    /// A missing file is an empty store with a fresh salt, not an error.
    fn load_locked(&self) -> Result<(Payload, [u8; SALT_LEN]), SecretError> {
        match fs::read(self.active_path()) {
            Ok(blob) => codec::open(&blob, &self.recipe),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok((Payload::new(), codec::generate_salt()))
            }
            Err(err) => Err(SecretError::storage(err)),
        }
    }

    fn save_locked(&self, payload: &Payload, salt: &[u8; SALT_LEN]) -> Result<(), SecretError> {
        let sealed = codec::seal(payload, &self.recipe, salt, self.active)?;
        lockfile::atomic_write(self.active_path(), &sealed)
    }

    fn probe_writable(&self) -> bool {
        let probe = || -> Result<(), SecretError> {
            let _lock = self.lock()?;
            let (mut payload, salt) = self.load_locked()?;
            payload.insert(PROBE_KEY.to_string(), SecretEntry::new("probe"));
            self.save_locked(&payload, &salt)?;
            payload.remove(PROBE_KEY);
            self.save_locked(&payload, &salt)
        };
        match probe() {
            Ok(()) => true,
            Err(err) => {
                warn!(store = self.name.as_str(), "keystore is not writable: {err}");
                false
            }
        }
    }
}

impl SecretStore for LocalSecretStore {
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
        let _lock = self.lock()?;
        let (payload, _) = self.load_locked()?;
        Ok(payload
            .get(key)
            .map(|entry| entry.value.clone())
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

        let _lock = self.lock()?;
        let (mut payload, salt) = self.load_locked()?;
        payload.insert(key.to_string(), SecretEntry::new(value));
        self.save_locked(&payload, &salt)?;
        debug!(store = self.name.as_str(), "stored secret");
        Ok(())
    }

    fn delete_secret(&self, key: &str) -> Result<(), SecretError> {
        validation::validate_secret_key(key)?;
        if self.read_only {
            return Err(SecretError::ReadOnly {
                store: self.name.clone(),
            });
        }

        let _lock = self.lock()?;
        let (mut payload, salt) = self.load_locked()?;
        if payload.remove(key).is_none() {
            debug!(store = self.name.as_str(), "delete of absent key is a no-op");
            return Ok(());
        }
        self.save_locked(&payload, &salt)
    }
}
