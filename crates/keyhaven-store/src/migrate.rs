//! Legacy keystore migration: upgrade v2 files to the v3 format, backing up
//! the original and falling back to the legacy file when the upgrade fails.

use std::{
    fs,
    path::{Path, PathBuf},
};

use keyhaven_core::SecretError;
use tracing::{info, warn};

use crate::{
    codec::{self, FormatVersion},
    derive::KeyRecipe,
    lockfile,
};

/// The v2/v3/backup file triple for one store scope.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub v3: PathBuf,
    pub v2: PathBuf,
    pub backup: PathBuf,
}

impl StorePaths {
    pub fn new(directory: &Path, app_short_name: &str) -> Self {
        Self {
            v3: directory.join(format!("{app_short_name}.v3keystore")),
            v2: directory.join(format!("{app_short_name}.v2keystore")),
            backup: directory.join(format!("{app_short_name}.v2keystore_old")),
        }
    }
}

/// Tagged migration result. The fallback path is a value, not an exception:
/// callers decide which file and recipe to serve from by matching on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Neither format exists yet; a v3 file appears on first write.
    Fresh,
    /// A v3 file already exists; migration skipped entirely.
    AlreadyCurrent,
    /// Secrets were re-encrypted into v3 and the v2 original renamed away.
    Migrated { backup: PathBuf },
    /// Migration failed; the v2 file is untouched and stays authoritative.
    /// This is the one absorbed failure in the engine: raising here would
    /// leave the application permanently unable to start.
    FellBack { reason: String },
}

/// Inspect the store scope and migrate if a legacy file is the only copy.
/// Must be called with the store lock held.
pub fn ensure_current(
    paths: &StorePaths,
    current: &KeyRecipe,
    legacy: &KeyRecipe,
) -> MigrationOutcome {
    if paths.v3.exists() {
        return MigrationOutcome::AlreadyCurrent;
    }
    if !paths.v2.exists() {
        return MigrationOutcome::Fresh;
    }

    info!(path = %paths.v2.display(), "found legacy v2 keystore, migrating to v3");
    match migrate(paths, current, legacy) {
        Ok(backup) => {
            info!(backup = %backup.display(), "migration complete");
            MigrationOutcome::Migrated { backup }
        }
        Err(err) => {
            warn!("keystore migration failed, continuing on v2: {err}");
            MigrationOutcome::FellBack {
                reason: err.to_string(),
            }
        }
    }
}

fn migrate(
    paths: &StorePaths,
    current: &KeyRecipe,
    legacy: &KeyRecipe,
) -> Result<PathBuf, SecretError> {
    let blob = fs::read(&paths.v2).map_err(SecretError::storage)?;
    if codec::detect_version(&blob)? != FormatVersion::V2 {
        return Err(SecretError::integrity("legacy file is not a v2 keystore"));
    }
    let (payload, _) = codec::open(&blob, legacy)?;

    // The v3 file must be complete and durable before the v2 original is
    // renamed; there is no state where neither file holds the secrets.
    let salt = codec::generate_salt();
    let sealed = codec::seal(&payload, current, &salt, FormatVersion::V3)?;
    lockfile::atomic_write(&paths.v3, &sealed)?;

    if let Err(err) = fs::rename(&paths.v2, &paths.backup) {
        // Keep v2 as the single source of truth rather than leaving two
        // divergent live copies.
        let _ = fs::remove_file(&paths.v3);
        return Err(SecretError::storage(err));
    }
    Ok(paths.backup.clone())
}
