//! Argon2id password hashing.
//!
//! Parameters are the `argon2` crate defaults (Argon2id, 19 MiB memory,
//! 2 iterations, 1 lane). They are embedded in the PHC string, so stored
//! digests keep verifying if the defaults ever change.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    HashingFailure(String),
    #[error("stored password digest is malformed: {0}")]
    MalformedDigest(String),
}

pub fn hash_password(plain: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            PasswordError::HashingFailure(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Returns `Ok(false)` on a mismatch; only a corrupt digest is an error.
pub fn verify_password(plain: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        PasswordError::MalformedDigest(e.to_string())
    })?;
    match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::MalformedDigest(e.to_string())),
    }
}
