//! Password hashing and verification using Argon2
//!
//! Hashes are stored in PHC format on the user record; the plaintext never
//! reaches the store.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::StudyhallError;

/// Shortest password accepted at registration
pub const MIN_PASSWORD_LEN: usize = 6;

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String, StudyhallError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StudyhallError::Auth(format!("Failed to hash password: {e}")))
}

/// Verify a password against a stored hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, StudyhallError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| StudyhallError::Auth(format!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Reject passwords too short to register with
pub fn check_password_strength(password: &str) -> Result<(), StudyhallError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(StudyhallError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}
