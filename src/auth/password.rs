//! Argon2id password hashes stored as PHC strings.
//!
//! Hashes written before the switch to Argon2 (`salt$sha256hex`) still verify
//! and are reported by [`needs_rehash`] so sign-in can upgrade them.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::Rng;
use sha2::{Digest, Sha256};

use super::AuthError;

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    let salt = SaltString::encode_b64(&bytes).map_err(|e| AuthError::Hash(e.to_string()))?;

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Hash(e.to_string()))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    if stored.starts_with('$') {
        return PasswordHash::new(stored)
            .map(|hash| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &hash)
                    .is_ok()
            })
            .unwrap_or(false);
    }
    verify_legacy(password, stored)
}

/// True for hashes in the old `salt$digest` form.
pub fn needs_rehash(stored: &str) -> bool {
    !stored.starts_with('$')
}

fn verify_legacy(password: &str, stored: &str) -> bool {
    let Some((salt, expected)) = stored.split_once('$') else {
        return false;
    };
    if salt.is_empty() || expected.is_empty() {
        return false;
    }
    let actual = legacy_digest(salt, password);

    // Compare every byte regardless of where the first mismatch is
    actual.len() == expected.len()
        && actual
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn legacy_digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let stored = hash_password("secret1").unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(verify_password("secret1", &stored));
        assert!(!verify_password("secret2", &stored));
        assert!(!needs_rehash(&stored));
    }

    #[test]
    fn test_hashes_are_salted() {
        assert_ne!(
            hash_password("secret1").unwrap(),
            hash_password("secret1").unwrap()
        );
    }

    #[test]
    fn test_legacy_hash_still_verifies() {
        let stored = format!("somesalt${}", legacy_digest("somesalt", "secret1"));
        assert!(verify_password("secret1", &stored));
        assert!(!verify_password("secret2", &stored));
        assert!(needs_rehash(&stored));
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!verify_password("secret1", "no-separator"));
        assert!(!verify_password("secret1", "$argon2id$garbage"));
        assert!(!verify_password("", "$"));
        assert!(!verify_password("", ""));
    }
}
