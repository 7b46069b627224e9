//! Authenticated encryption of the on-disk keystore blob.
//!
//! Layout: 4-byte format magic, 16-byte salt, 12-byte nonce, AES-256-GCM
//! ciphertext (tag included). The magic and salt are bound as associated
//! data, so tampering with the version tag or salt fails authentication just
//! like tampering with the ciphertext.

use std::collections::BTreeMap;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload as AeadPayload},
    Aes256Gcm, Nonce,
};
use chrono::{DateTime, Utc};
use keyhaven_core::SecretError;
use serde::{Deserialize, Serialize};

use crate::derive::KeyRecipe;

pub const MAGIC_V3: [u8; 4] = *b"KHV3";
pub const MAGIC_V2: [u8; 4] = *b"KHV2";
pub const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = 4 + SALT_LEN + NONCE_LEN;
/// GCM tag length; the shortest blob is a sealed empty map.
const TAG_LEN: usize = 16;

/// On-disk keystore format versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    V2,
    V3,
}

impl FormatVersion {
    fn magic(self) -> [u8; 4] {
        match self {
            FormatVersion::V2 => MAGIC_V2,
            FormatVersion::V3 => MAGIC_V3,
        }
    }
}

/// One stored secret with minimal metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretEntry {
    pub value: String,
    pub created_at: DateTime<Utc>,
}

impl SecretEntry {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            created_at: Utc::now(),
        }
    }
}

/// Decrypted keystore payload: a flat name → entry map.
pub type Payload = BTreeMap<String, SecretEntry>;

pub fn generate_salt() -> [u8; SALT_LEN] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Read the format version from a blob's magic without needing a key, so the
/// migration engine can classify files it cannot yet decrypt.
pub fn detect_version(blob: &[u8]) -> Result<FormatVersion, SecretError> {
    if blob.len() < 4 {
        return Err(SecretError::integrity("keystore file is truncated"));
    }
    match <[u8; 4]>::try_from(&blob[..4]) {
        Ok(MAGIC_V3) => Ok(FormatVersion::V3),
        Ok(MAGIC_V2) => Ok(FormatVersion::V2),
        _ => Err(SecretError::integrity("unrecognized keystore format tag")),
    }
}

/// Seal a payload under the key derived from `recipe` and `salt`.
pub fn seal(
    payload: &Payload,
    recipe: &KeyRecipe,
    salt: &[u8; SALT_LEN],
    version: FormatVersion,
) -> Result<Vec<u8>, SecretError> {
    let plaintext = serde_json::to_vec(payload).map_err(SecretError::storage)?;

    let key = recipe.derive(salt);
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(SecretError::storage)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(&version.magic());
    header.extend_from_slice(salt);

    let ciphertext = cipher
        .encrypt(
            &nonce,
            AeadPayload {
                msg: &plaintext,
                aad: &header,
            },
        )
        .map_err(|_| SecretError::storage("encryption failed"))?;

    let mut blob = header;
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Open a sealed blob, verifying authenticity. Any failure — wrong key,
/// truncation, bit flip in any region — is a terminal `Integrity` error;
/// this never degrades to an empty payload.
pub fn open(blob: &[u8], recipe: &KeyRecipe) -> Result<(Payload, [u8; SALT_LEN]), SecretError> {
    if blob.len() < HEADER_LEN + TAG_LEN {
        return Err(SecretError::integrity("keystore file is truncated"));
    }
    detect_version(blob)?;

    let header = &blob[..HEADER_LEN - NONCE_LEN];
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&blob[4..4 + SALT_LEN]);
    let nonce = Nonce::from_slice(&blob[HEADER_LEN - NONCE_LEN..HEADER_LEN]);
    let ciphertext = &blob[HEADER_LEN..];

    let key = recipe.derive(&salt);
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(SecretError::storage)?;

    let plaintext = cipher
        .decrypt(
            nonce,
            AeadPayload {
                msg: ciphertext,
                aad: header,
            },
        )
        .map_err(|_| {
            SecretError::integrity("authentication failed: wrong key or tampered file")
        })?;

    let payload: Payload = serde_json::from_slice(&plaintext)
        .map_err(|_| SecretError::integrity("authenticated payload failed to decode"))?;
    Ok((payload, salt))
}
