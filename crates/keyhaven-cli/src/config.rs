use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::{config_dir, data_dir};
use serde::{Deserialize, Serialize};

/// User-level configuration loaded from `~/.config/keyhaven/config.toml`
/// (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Short name used in keystore file names and key derivation. Changing
    /// it orphans existing keystores, so it is set once per deployment.
    pub app_short_name: Option<String>,
    /// Override for the per-user keystore directory.
    pub data_dir: Option<PathBuf>,
    /// Optional shared application keystore directory; when set, a second
    /// lower-priority store is mounted from it.
    pub app_dir: Option<PathBuf>,
    /// Store that mutations target when none is named on the command line.
    pub default_store: Option<String>,
}

impl Config {
    pub fn app_short_name(&self) -> &str {
        self.app_short_name.as_deref().unwrap_or("keyhaven")
    }

    /// Per-user keystore directory, configured or platform default.
    pub fn user_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
        Ok(base.join(self.app_short_name()))
    }

    pub fn default_store(&self) -> &str {
        self.default_store.as_deref().unwrap_or("user")
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("keyhaven").join("config.toml"))
}

/// Write the given config to disk, creating parent directories as needed.
/// Leaves an existing file untouched to avoid clobbering user edits.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    let path = default_path()?;
    write_to_path_if_missing(config, &path)?;
    Ok(path)
}

fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(())
}
