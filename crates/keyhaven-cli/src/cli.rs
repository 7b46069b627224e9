use clap::{Parser, Subcommand};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "keyhaven",
    about = "Encrypted local secret store with multi-store resolution",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Extra password mixed into key derivation.
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Use --password alone as the key source, skipping machine binding.
    #[arg(long, global = true, requires = "password")]
    pub user_override: bool,

    /// Derive keys from the environment password instead of the machine
    /// fingerprint (also enabled by CONTAINER_MODE=true).
    #[arg(long, global = true)]
    pub container_mode: bool,

    /// Target a specific store by name instead of priority resolution.
    #[arg(long, global = true)]
    pub store: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a default config file and initialize the keystore files.
    Init,
    /// Print a secret's value.
    Get {
        key: String,
        /// Value to print when the secret is not found in any store.
        #[arg(long)]
        default: Option<String>,
    },
    /// Store a secret, overwriting any existing value.
    Set { key: String, value: String },
    /// Delete a secret (deleting an absent key succeeds).
    Delete { key: String },
    /// Generate a random secret, store it, and print it.
    Create {
        name: String,
        /// Generated secret length in characters.
        #[arg(long, default_value_t = 18)]
        length: usize,
    },
    /// List configured stores and their status.
    Stores,
}
