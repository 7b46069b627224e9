//! File-backed encrypted secret store: machine fingerprinting, key
//! derivation, the authenticated keystore codec, cross-process locking with
//! atomic writes, format migration, and the `LocalSecretStore` facade.

pub mod codec;
pub mod derive;
pub mod fingerprint;
pub mod import;
pub mod local;
pub mod lockfile;
pub mod migrate;

pub use derive::KeyRecipe;
pub use fingerprint::Fingerprint;
pub use local::{LocalSecretStore, StoreOptions};
pub use migrate::MigrationOutcome;
