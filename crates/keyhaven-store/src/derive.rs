//! Password derivation: turns machine/deployment context into the symmetric
//! key that seals a keystore file.

use std::path::PathBuf;

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use crate::fingerprint::Fingerprint;

/// Iteration floor for every current-format derivation (OWASP minimum).
pub const CURRENT_ITERATIONS: u32 = 100_000;
/// Weak count kept only to open legacy v2 files during migration.
pub const LEGACY_ITERATIONS: u32 = 20_000;

pub const KEY_LEN: usize = 32;

/// Environment channel for the container-mode password.
pub const KEYSTORE_PASSWORD_ENV: &str = "KEYSTORE_PASSWORD";
pub const SECRETS_STORE_PASSWORD_ENV: &str = "SECRETS_STORE_PASSWORD";
pub const CONTAINER_MODE_ENV: &str = "CONTAINER_MODE";

/// Closed set of derivation modes. The mode is fixed when a store is opened;
/// `derive` is deterministic for a given recipe and salt.
pub enum KeyRecipe {
    /// Password used directly, stretched with the per-file salt only — no
    /// fingerprint or path mixing. Container mode and explicit user override
    /// both land here, so processes with different fingerprints sharing one
    /// mounted file derive the same key.
    Direct { password: String },
    /// Default mode: fingerprint, app name, keystore path, and any custom
    /// password are concatenated and strengthened. Changing the app name or
    /// path changes the key, preventing reuse across unrelated stores.
    Machine {
        fingerprint: Fingerprint,
        app_name: String,
        keystore_path: PathBuf,
        custom_password: Option<String>,
    },
    /// Migration-only recipe for legacy v2 files: machine id and path with a
    /// weak iteration count. Never used to create new files.
    LegacyV2 {
        machine_id: String,
        keystore_path: PathBuf,
    },
}

impl KeyRecipe {
    /// Derive a 256-bit key with PBKDF2-HMAC-SHA256 over this recipe's seed
    /// and the keystore's persisted salt.
    pub fn derive(&self, salt: &[u8]) -> [u8; KEY_LEN] {
        let (seed, iterations) = match self {
            KeyRecipe::Direct { password } => (password.as_bytes().to_vec(), CURRENT_ITERATIONS),
            KeyRecipe::Machine {
                fingerprint,
                app_name,
                keystore_path,
                custom_password,
            } => {
                let mut seed = fingerprint.digest().to_vec();
                seed.push(b':');
                seed.extend_from_slice(app_name.as_bytes());
                seed.push(b':');
                seed.extend_from_slice(keystore_path.to_string_lossy().as_bytes());
                if let Some(password) = custom_password {
                    seed.push(b':');
                    seed.extend_from_slice(password.as_bytes());
                }
                (seed, CURRENT_ITERATIONS)
            }
            KeyRecipe::LegacyV2 {
                machine_id,
                keystore_path,
            } => {
                let mut seed = machine_id.as_bytes().to_vec();
                seed.extend_from_slice(keystore_path.to_string_lossy().as_bytes());
                (seed, LEGACY_ITERATIONS)
            }
        };

        let mut key = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(&seed, salt, iterations, &mut key);
        key
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, KeyRecipe::LegacyV2 { .. })
    }
}

/// Container-mode password from the recognized environment channels, checked
/// in precedence order. An empty variable counts as unset, so an empty
/// `KEYSTORE_PASSWORD` does not mask a set `SECRETS_STORE_PASSWORD`.
pub fn container_password_from_env() -> Option<String> {
    [KEYSTORE_PASSWORD_ENV, SECRETS_STORE_PASSWORD_ENV]
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|p| !p.is_empty()))
}

pub fn container_mode_from_env() -> bool {
    std::env::var(CONTAINER_MODE_ENV)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint(id: &str) -> Fingerprint {
        Fingerprint::from_parts(Some(id.into()), vec![format!("machine_id:{id}")])
    }

    fn machine_recipe(id: &str, app: &str, path: &str, password: Option<&str>) -> KeyRecipe {
        KeyRecipe::Machine {
            fingerprint: fingerprint(id),
            app_name: app.into(),
            keystore_path: PathBuf::from(path),
            custom_password: password.map(String::from),
        }
    }

    const SALT: &[u8] = &[7u8; 16];

    #[test]
    fn derivation_is_deterministic() {
        let a = machine_recipe("m1", "app", "/tmp/app.v3keystore", Some("pw")).derive(SALT);
        let b = machine_recipe("m1", "app", "/tmp/app.v3keystore", Some("pw")).derive(SALT);
        assert_eq!(a, b);
    }

    #[test]
    fn changing_any_input_changes_the_key() {
        let base = machine_recipe("m1", "app", "/tmp/app.v3keystore", Some("pw")).derive(SALT);
        let variants = [
            machine_recipe("m2", "app", "/tmp/app.v3keystore", Some("pw")),
            machine_recipe("m1", "other", "/tmp/app.v3keystore", Some("pw")),
            machine_recipe("m1", "app", "/tmp/other.v3keystore", Some("pw")),
            machine_recipe("m1", "app", "/tmp/app.v3keystore", Some("pw2")),
            machine_recipe("m1", "app", "/tmp/app.v3keystore", None),
        ];
        for variant in variants {
            assert_ne!(base, variant.derive(SALT));
        }
        assert_ne!(
            base,
            machine_recipe("m1", "app", "/tmp/app.v3keystore", Some("pw")).derive(&[8u8; 16])
        );
    }

    #[test]
    fn direct_mode_ignores_fingerprint_and_path() {
        let a = KeyRecipe::Direct {
            password: "shared-pw".into(),
        }
        .derive(SALT);
        let b = KeyRecipe::Direct {
            password: "shared-pw".into(),
        }
        .derive(SALT);
        assert_eq!(a, b);

        let other = KeyRecipe::Direct {
            password: "other-pw".into(),
        }
        .derive(SALT);
        assert_ne!(a, other);
    }

    #[test]
    fn direct_and_machine_modes_disagree() {
        let direct = KeyRecipe::Direct {
            password: "pw".into(),
        }
        .derive(SALT);
        let machine = machine_recipe("m1", "app", "/tmp/app.v3keystore", Some("pw")).derive(SALT);
        assert_ne!(direct, machine);
    }

    // Environment tests share the process environment; the guard keeps them
    // from interleaving.
    static ENV_GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn env_password_precedence() {
        let _guard = ENV_GUARD.lock().unwrap_or_else(|e| e.into_inner());

        std::env::remove_var(KEYSTORE_PASSWORD_ENV);
        std::env::remove_var(SECRETS_STORE_PASSWORD_ENV);
        assert_eq!(container_password_from_env(), None);

        std::env::set_var(SECRETS_STORE_PASSWORD_ENV, "secondary");
        assert_eq!(container_password_from_env().as_deref(), Some("secondary"));

        std::env::set_var(KEYSTORE_PASSWORD_ENV, "primary");
        assert_eq!(container_password_from_env().as_deref(), Some("primary"));

        std::env::remove_var(KEYSTORE_PASSWORD_ENV);
        std::env::remove_var(SECRETS_STORE_PASSWORD_ENV);
    }

    #[test]
    fn empty_env_password_counts_as_unset() {
        let _guard = ENV_GUARD.lock().unwrap_or_else(|e| e.into_inner());

        std::env::set_var(KEYSTORE_PASSWORD_ENV, "");
        std::env::set_var(SECRETS_STORE_PASSWORD_ENV, "secondary");
        assert_eq!(container_password_from_env().as_deref(), Some("secondary"));

        std::env::set_var(SECRETS_STORE_PASSWORD_ENV, "");
        assert_eq!(container_password_from_env(), None);

        std::env::remove_var(KEYSTORE_PASSWORD_ENV);
        std::env::remove_var(SECRETS_STORE_PASSWORD_ENV);
    }

    #[test]
    fn container_mode_env_is_true_case_insensitive() {
        let _guard = ENV_GUARD.lock().unwrap_or_else(|e| e.into_inner());

        std::env::remove_var(CONTAINER_MODE_ENV);
        assert!(!container_mode_from_env());

        for value in ["true", "TRUE", "True"] {
            std::env::set_var(CONTAINER_MODE_ENV, value);
            assert!(container_mode_from_env(), "{value} should enable");
        }
        for value in ["false", "1", "yes", ""] {
            std::env::set_var(CONTAINER_MODE_ENV, value);
            assert!(!container_mode_from_env(), "{value} should not enable");
        }

        std::env::remove_var(CONTAINER_MODE_ENV);
    }

    #[test]
    fn legacy_recipe_differs_from_current() {
        let legacy = KeyRecipe::LegacyV2 {
            machine_id: "m1".into(),
            keystore_path: PathBuf::from("/tmp/app.v2keystore"),
        };
        assert!(legacy.is_legacy());
        let current = machine_recipe("m1", "app", "/tmp/app.v2keystore", None);
        assert_ne!(legacy.derive(SALT), current.derive(SALT));
    }
}
