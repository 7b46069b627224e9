//! Bulk secret import: a `secrets.json` manifest dropped next to the
//! keystore is loaded into the store on open, then deleted so its plaintext
//! does not linger on disk.

use std::{fs, path::Path};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use keyhaven_core::{validation::MAX_VALUE_BYTES, SecretError, SecretStore};
use serde::Deserialize;
use tracing::{info, warn};

pub const MANIFEST_FILE: &str = "secrets.json";

#[derive(Debug, Deserialize)]
struct Manifest {
    secrets: Vec<ManifestEntry>,
}

/// One manifest entry: an inline `value` or a `file` to read, exclusively.
#[derive(Debug, Deserialize)]
struct ManifestEntry {
    name: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    file: Option<std::path::PathBuf>,
    #[serde(default)]
    store_as: StoreAs,
}

/// How file contents are stored: as UTF-8 text, or base64-encoded so binary
/// material (certificates, key files) survives the string-valued store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreAs {
    #[default]
    Raw,
    Base64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub failed: usize,
}

/// Import `secrets.json` from `directory` into `store`, if present.
///
/// Individual entry failures are logged and counted, never fatal; a manifest
/// that cannot be read or parsed is left in place and reported as an error.
/// After processing, the manifest is deleted even when some entries failed.
pub fn run_auto_import(
    store: &dyn SecretStore,
    directory: &Path,
) -> Result<Option<ImportSummary>, SecretError> {
    let manifest_path = directory.join(MANIFEST_FILE);
    let raw = match fs::read(&manifest_path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(SecretError::storage(err)),
    };
    let manifest: Manifest = serde_json::from_slice(&raw)
        .map_err(|err| SecretError::validation(format!("invalid secrets manifest: {err}")))?;

    info!(
        path = %manifest_path.display(),
        entries = manifest.secrets.len(),
        "importing secrets manifest"
    );

    let mut summary = ImportSummary::default();
    for entry in &manifest.secrets {
        match import_entry(store, entry, directory) {
            Ok(()) => summary.imported += 1,
            Err(err) => {
                warn!(name = entry.name.as_str(), "skipping manifest entry: {err}");
                summary.failed += 1;
            }
        }
    }

    // The manifest holds plaintext; remove it regardless of entry failures.
    if let Err(err) = fs::remove_file(&manifest_path) {
        warn!(path = %manifest_path.display(), "failed to delete imported manifest: {err}");
    }
    Ok(Some(summary))
}

fn import_entry(
    store: &dyn SecretStore,
    entry: &ManifestEntry,
    directory: &Path,
) -> Result<(), SecretError> {
    let value = match (&entry.value, &entry.file) {
        (Some(_), Some(_)) => {
            return Err(SecretError::validation(
                "entry has both 'value' and 'file'",
            ))
        }
        (None, None) => {
            return Err(SecretError::validation(
                "entry has neither 'value' nor 'file'",
            ))
        }
        (Some(value), None) => value.clone(),
        (None, Some(file)) => read_file_value(file, entry.store_as, directory)?,
    };
    store.set_secret(&entry.name, &value)
}

fn read_file_value(
    file: &Path,
    store_as: StoreAs,
    directory: &Path,
) -> Result<String, SecretError> {
    let path = if file.is_relative() {
        directory.join(file)
    } else {
        file.to_path_buf()
    };
    let bytes = fs::read(&path).map_err(SecretError::storage)?;
    if bytes.len() > MAX_VALUE_BYTES {
        return Err(SecretError::validation(format!(
            "file '{}' exceeds the {MAX_VALUE_BYTES} byte value limit",
            path.display()
        )));
    }
    match store_as {
        StoreAs::Raw => String::from_utf8(bytes)
            .map_err(|_| SecretError::validation("file is not valid UTF-8; use store_as base64")),
        StoreAs::Base64 => Ok(BASE64.encode(bytes)),
    }
}
