//! Password hashing with Argon2id.
//!
//! Hashes are stored as PHC strings, so parameters and salt travel with the
//! hash and can be upgraded without a migration.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::sync::OnceLock;

/// Hash a plaintext password with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("failed to hash password: {e}"))
}

/// Verify a plaintext password against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch; `Err` only for malformed hashes.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| anyhow!("invalid password hash: {e}"))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow!("failed to verify password: {e}")),
    }
}

/// Hash verified when the email is unknown, keeping login latency uniform
/// between unknown-email and wrong-password failures.
pub fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| hash_password("entrada-placeholder").unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() -> Result<()> {
        let password = "correct horse battery staple";
        let hash = hash_password(password)?;

        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(password, &hash)?);
        Ok(())
    }

    #[test]
    fn wrong_password_is_rejected() -> Result<()> {
        let hash = hash_password("right")?;
        assert!(!verify_password("wrong", &hash)?);
        Ok(())
    }

    #[test]
    fn same_password_different_salts() -> Result<()> {
        let first = hash_password("secret123")?;
        let second = hash_password("secret123")?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("secret123", "not-a-phc-string").is_err());
    }

    #[test]
    fn dummy_hash_never_matches_user_input() -> Result<()> {
        let hash = dummy_hash();
        assert!(!verify_password("secret123", hash)?);
        Ok(())
    }
}
