//! Password hashing and verification (Argon2id, PHC string format).

use argon2::{
    Argon2,
    password_hash::{
        self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use thiserror::Error;

/// Errors from the password hasher.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashError {
    /// Hashing a new password failed.
    #[error("password hashing failed: {0}")]
    Hashing(String),

    /// The stored hash is not a parseable PHC string.
    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),

    /// The hasher failed while comparing.
    #[error("password verification failed: {0}")]
    Verification(String),
}

/// Hash a password with a fresh random salt.
///
/// # Errors
///
/// Returns `HashError::Hashing` if Argon2 rejects the input.
pub fn hash(password: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| HashError::Hashing(e.to_string()))
}

/// Check a submitted password against a stored hash in constant time.
///
/// A wrong password is `Ok(false)`, not an error.
///
/// # Errors
///
/// Returns `HashError::MalformedHash` if `stored_hash` cannot be parsed.
pub fn verify(submitted: &str, stored_hash: &str) -> Result<bool, HashError> {
    let parsed =
        PasswordHash::new(stored_hash).map_err(|e| HashError::MalformedHash(e.to_string()))?;

    match Argon2::default().verify_password(submitted.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(HashError::Verification(e.to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let stored = hash("correct horse").unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(verify("correct horse", &stored).unwrap());
    }

    #[test]
    fn test_wrong_password_is_false() {
        let stored = hash("correct horse").unwrap();
        assert!(!verify("battery staple", &stored).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(hash("same").unwrap(), hash("same").unwrap());
    }

    #[test]
    fn test_malformed_hash_is_error() {
        assert!(matches!(
            verify("anything", "not-a-phc-string"),
            Err(HashError::MalformedHash(_))
        ));
    }
}
