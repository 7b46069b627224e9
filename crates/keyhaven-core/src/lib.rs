//! Core abstractions for keyhaven: the secret-store contract, input
//! validation, secure secret generation, and the priority-based resolver.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod error;
pub mod generate;
pub mod resolver;
pub mod store;
pub mod validation;

pub use error::SecretError;
pub use resolver::SecretResolver;
pub use store::{MemorySecretStore, SecretStore};
