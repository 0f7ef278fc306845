//! Cart ownership keys.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::id::UserId;
use super::session_key::SessionKey;

/// Which kind of principal owns a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Session,
    User,
}

impl OwnerKind {
    /// Value stored in the `owner_kind` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::User => "user",
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The key a cart is stored under.
///
/// A guest cart is keyed by its session, an account cart by its user. Two
/// keys are equal only when both the variant and the payload match, so a
/// session key can never collide with a user id even if their textual forms
/// happened to coincide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum OwnerKey {
    Session(SessionKey),
    User(UserId),
}

impl OwnerKey {
    #[must_use]
    pub const fn kind(&self) -> OwnerKind {
        match self {
            Self::Session(_) => OwnerKind::Session,
            Self::User(_) => OwnerKind::User,
        }
    }

    /// Payload as stored in the `owner_key` column.
    #[must_use]
    pub fn storage_key(&self) -> String {
        match self {
            Self::Session(key) => key.as_str().to_owned(),
            Self::User(id) => id.to_string(),
        }
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(key) => write!(f, "session:{}", key.fingerprint()),
            Self::User(id) => write!(f, "user:{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variants_never_equal() {
        let session = OwnerKey::Session(SessionKey::generate());
        let user = OwnerKey::User(UserId::new(1));
        assert_ne!(session, user);
        assert_eq!(session.kind(), OwnerKind::Session);
        assert_eq!(user.kind(), OwnerKind::User);
    }

    #[test]
    fn test_storage_columns() {
        let user = OwnerKey::User(UserId::new(17));
        assert_eq!(user.kind().as_str(), "user");
        assert_eq!(user.storage_key(), "17");
    }

    #[test]
    fn test_display_does_not_leak_session_key() {
        let key = SessionKey::generate();
        let owner = OwnerKey::Session(key.clone());
        assert!(!owner.to_string().contains(key.as_str()));
    }
}
