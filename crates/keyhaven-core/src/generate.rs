//! Secure random secret generation backed by the OS entropy source.

use rand::{rngs::OsRng, Rng};

use crate::error::SecretError;

pub const MIN_SECRET_LEN: usize = 12;
pub const MAX_SECRET_LEN: usize = 1024;

const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const SYMBOLS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Known weak substrings a generated secret must not contain.
const WEAK_SEQUENCES: &[&str] = &["abcdefgh", "12345678", "qwertyui", "87654321", "password"];

const MAX_ATTEMPTS: usize = 50;

/// Generate a random secret of `length` characters drawn from a mixed
/// charset, rejection-sampled until it contains every character class and no
/// weak pattern. Uses `OsRng`, never a general-purpose PRNG.
pub fn generate_secret(length: usize) -> Result<String, SecretError> {
    if !(MIN_SECRET_LEN..=MAX_SECRET_LEN).contains(&length) {
        return Err(SecretError::validation(format!(
            "secret length must be between {MIN_SECRET_LEN} and {MAX_SECRET_LEN}"
        )));
    }

    let charset: Vec<char> = [LOWER, UPPER, DIGITS, SYMBOLS]
        .concat()
        .chars()
        .collect();

    for _ in 0..MAX_ATTEMPTS {
        let candidate: String = (0..length)
            .map(|_| charset[OsRng.gen_range(0..charset.len())])
            .collect();

        if has_all_classes(&candidate) && !is_weak(&candidate) {
            return Ok(candidate);
        }
    }

    // With 50 attempts at length >= 12 this is unreachable in practice.
    Err(SecretError::storage(
        "failed to generate a compliant secret",
    ))
}

fn has_all_classes(secret: &str) -> bool {
    secret.chars().any(|c| c.is_ascii_lowercase())
        && secret.chars().any(|c| c.is_ascii_uppercase())
        && secret.chars().any(|c| c.is_ascii_digit())
        && secret.chars().any(|c| SYMBOLS.contains(c))
}

fn is_weak(secret: &str) -> bool {
    let lower = secret.to_ascii_lowercase();
    if WEAK_SEQUENCES.iter().any(|seq| lower.contains(seq)) {
        return true;
    }
    // 4+ identical characters in a row.
    let chars: Vec<char> = secret.chars().collect();
    chars.windows(4).any(|w| w.iter().all(|&c| c == w[0]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_requested_length_with_all_classes() {
        for length in [12, 18, 64] {
            let secret = generate_secret(length).expect("generate");
            assert_eq!(secret.len(), length);
            assert!(has_all_classes(&secret));
        }
    }

    #[test]
    fn successive_secrets_differ() {
        let a = generate_secret(24).expect("generate");
        let b = generate_secret(24).expect("generate");
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_out_of_range_lengths() {
        assert!(generate_secret(0).is_err());
        assert!(generate_secret(MIN_SECRET_LEN - 1).is_err());
        assert!(generate_secret(MAX_SECRET_LEN + 1).is_err());
    }

    #[test]
    fn weak_patterns_are_detected() {
        assert!(is_weak("xxPassword123!x"));
        assert!(is_weak("aaaa-Bc12!zzzz"));
        assert!(!is_weak("tR7!pQ2@wX9#mN4"));
    }
}
