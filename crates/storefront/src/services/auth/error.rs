//! Authentication error types.

use thiserror::Error;

use super::password::HashError;
use super::token::MintError;
use crate::store::StoreError;

/// Errors that can occur while authenticating an account.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The password does not match the account.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// No account exists for the email.
    #[error("user not found")]
    UserNotFound,

    /// The requested application is not registered.
    #[error("application not found")]
    AppNotFound,

    /// Storage, hashing or minting failed.
    #[error("internal auth error: {0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<HashError> for AuthError {
    fn from(err: HashError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<MintError> for AuthError {
    fn from(err: MintError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Errors that can occur while registering an account.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// An account with this email already exists.
    #[error("user already exists")]
    AlreadyExists,

    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] corner_shop_core::EmailError),

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Storage or hashing failed.
    #[error("internal registration error: {0}")]
    Internal(String),
}

impl From<StoreError> for RegistrationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => Self::AlreadyExists,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<HashError> for RegistrationError {
    fn from(err: HashError) -> Self {
        Self::Internal(err.to_string())
    }
}
