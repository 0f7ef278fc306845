//! Guest session records.

use chrono::{DateTime, Utc};

use corner_shop_core::SessionKey;

/// An anonymous shopper's session.
///
/// Created lazily on first anonymous contact. Always satisfies
/// `expires_at > created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub key: SessionKey,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session can still be used at `now`.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
