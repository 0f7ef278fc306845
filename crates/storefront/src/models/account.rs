//! Customer accounts.

use core::fmt;

use chrono::{DateTime, Utc};

use corner_shop_core::{Email, UserId};

/// A registered customer account.
#[derive(Clone)]
pub struct Account {
    /// Unique account ID.
    pub user_id: UserId,
    /// Account email (unique, normalized).
    pub email: Email,
    /// Argon2id PHC string.
    pub password_hash: String,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}
