//! Drop password hashing.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::error::ClientError;

/// Minimum drop password length.
pub const MIN_PASSWORD_LENGTH: usize = 4;

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `ClientError::Validation` if the password is too short or cannot
/// be hashed.
pub fn hash_password(password: &str) -> Result<String, ClientError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ClientError::Validation(format!(
            "drop password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ClientError::Validation(format!("password hashing failed: {e}")))
}

/// Verify a password against a stored hash.
///
/// A malformed hash never verifies.
#[must_use]
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}
