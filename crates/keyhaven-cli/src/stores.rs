//! Wires configured keystore directories into a `SecretResolver`.

use std::path::Path;

use color_eyre::Result;
use keyhaven_core::{SecretResolver, SecretStore};
use keyhaven_store::{LocalSecretStore, StoreOptions};
use tracing::warn;

use crate::config::Config;

/// Command-line overrides affecting how keystore keys are derived.
#[derive(Debug, Default, Clone)]
pub struct AccessFlags {
    pub password: Option<String>,
    pub user_override: bool,
    pub container_mode: bool,
}

/// Open the configured stores and assemble the resolver. The per-user store
/// is mandatory; a configured shared app store that fails to open is logged
/// and skipped so one bad mount does not take the whole surface down.
pub fn build_resolver(config: &Config, flags: &AccessFlags) -> Result<SecretResolver> {
    let mut stores: Vec<Box<dyn SecretStore>> = Vec::new();

    let user_dir = config.user_data_dir()?;
    let user = LocalSecretStore::open(store_options("user", 0, &user_dir, config, flags))?;
    stores.push(Box::new(user));

    if let Some(app_dir) = &config.app_dir {
        match LocalSecretStore::open(store_options("app", 1, app_dir, config, flags)) {
            Ok(app) => stores.push(Box::new(app)),
            Err(err) => warn!(dir = %app_dir.display(), "skipping app store: {err}"),
        }
    }

    Ok(SecretResolver::new(stores).with_default_write_store(config.default_store()))
}

fn store_options(
    name: &str,
    priority: i32,
    directory: &Path,
    config: &Config,
    flags: &AccessFlags,
) -> StoreOptions {
    let mut options = StoreOptions::new(name, directory, config.app_short_name());
    options.priority = priority;
    options.custom_password = flags.password.clone();
    options.user_override = flags.user_override;
    // The flag adds to, never cancels, the environment setting.
    options.container_mode = options.container_mode || flags.container_mode;
    options
}
