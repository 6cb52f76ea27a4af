//! Password hashing
//!
//! PBKDF2-HMAC-SHA256 via OpenSSL. Hashes are self-describing:
//! `pbkdf2_sha256$<iterations>$<salt_hex>$<hash_hex>`.

use openssl::hash::MessageDigest;
use openssl::memcmp;
use openssl::pkcs5::pbkdf2_hmac;
use openssl::rand::rand_bytes;

use crate::error::{AppError, Result};

const SCHEME: &str = "pbkdf2_sha256";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 100;

/// Password hasher with a fixed iteration count for new hashes.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    iterations: u32,
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        let mut salt = [0u8; SALT_LEN];
        rand_bytes(&mut salt).map_err(|e| AppError::Internal(e.to_string()))?;
        let key = derive(password, &salt, self.iterations)?;

        Ok(format!(
            "{}${}${}${}",
            SCHEME,
            self.iterations,
            hex::encode(salt),
            hex::encode(key)
        ))
    }

    /// Verifies against a stored hash. Malformed hashes never match.
    pub fn verify(&self, password: &str, encoded: &str) -> bool {
        let parts: Vec<&str> = encoded.split('$').collect();
        let [scheme, iterations, salt, expected] = parts.as_slice() else {
            return false;
        };
        if *scheme != SCHEME {
            return false;
        }
        let (Ok(iterations), Ok(salt), Ok(expected)) = (
            iterations.parse::<u32>(),
            hex::decode(salt),
            hex::decode(expected),
        ) else {
            return false;
        };
        if expected.len() != KEY_LEN {
            return false;
        }

        match derive(password, &salt, iterations) {
            Ok(key) => memcmp::eq(&key, &expected),
            Err(_) => false,
        }
    }
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> Result<[u8; KEY_LEN]> {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac(
        password.as_bytes(),
        salt,
        iterations as usize,
        MessageDigest::sha256(),
        &mut key,
    )
    .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;
    Ok(key)
}

/// Length rules shared by registration, password change and reset.
pub fn validate_password(password: &str) -> Result<()> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at most {} characters",
            MAX_PASSWORD_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = PasswordHasher::new(1000);
        let hash = hasher.hash("correct horse battery").unwrap();

        assert!(hash.starts_with("pbkdf2_sha256$1000$"));
        assert!(hasher.verify("correct horse battery", &hash));
        assert!(!hasher.verify("wrong password", &hash));
    }

    #[test]
    fn test_salts_differ() {
        let hasher = PasswordHasher::new(1000);
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn test_verify_uses_stored_iterations() {
        let hash = PasswordHasher::new(500).hash("password123").unwrap();
        assert!(PasswordHasher::new(2000).verify("password123", &hash));
    }

    #[test]
    fn test_malformed_hash_never_matches() {
        let hasher = PasswordHasher::new(1000);
        assert!(!hasher.verify("x", ""));
        assert!(!hasher.verify("x", "bcrypt$10$abc$def"));
        assert!(!hasher.verify("x", "pbkdf2_sha256$abc$00$00"));
    }

    #[test]
    fn test_password_length_rules() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password(&"a".repeat(101)).is_err());
    }
}
