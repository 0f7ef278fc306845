//! Per-request caller identity.

use serde::{Deserialize, Serialize};

use super::email::Email;
use super::id::UserId;
use super::owner::OwnerKey;
use super::session_key::SessionKey;

/// Who a request belongs to.
///
/// Exactly one variant is produced per request. It is derived fresh from the
/// presented credentials every time and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    Anonymous { session_key: SessionKey },
    Authenticated { user_id: UserId, email: Email },
}

impl Identity {
    /// Key under which this caller's cart is stored.
    #[must_use]
    pub fn owner_key(&self) -> OwnerKey {
        match self {
            Self::Anonymous { session_key } => OwnerKey::Session(session_key.clone()),
            Self::Authenticated { user_id, .. } => OwnerKey::User(*user_id),
        }
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Authenticated { user_id, .. } => Some(*user_id),
            Self::Anonymous { .. } => None,
        }
    }

    #[must_use]
    pub const fn session_key(&self) -> Option<&SessionKey> {
        match self {
            Self::Anonymous { session_key } => Some(session_key),
            Self::Authenticated { .. } => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_key_follows_variant() {
        let key = SessionKey::generate();
        let anon = Identity::Anonymous {
            session_key: key.clone(),
        };
        assert_eq!(anon.owner_key(), OwnerKey::Session(key));
        assert!(!anon.is_authenticated());

        let user = Identity::Authenticated {
            user_id: UserId::new(5),
            email: Email::parse("a@b.c").unwrap(),
        };
        assert_eq!(user.owner_key(), OwnerKey::User(UserId::new(5)));
        assert_eq!(user.user_id(), Some(UserId::new(5)));
        assert!(user.session_key().is_none());
    }
}
