//! Per-request identity resolution.
//!
//! Every request is classified as exactly one [`Identity`]:
//!
//! 1. a valid token makes it `Authenticated`;
//! 2. otherwise a presented session key naming a live session makes it
//!    `Anonymous` under that key;
//! 3. otherwise a fresh session is created and the caller is told to persist
//!    its key.
//!
//! Token failures are never surfaced here. They only mean "no token".

use std::sync::Arc;

use chrono::Duration;
use tracing::instrument;

use corner_shop_core::{Clock, Identity, SessionKey};

use crate::services::auth::TokenService;
use crate::services::cart::CartError;
use crate::store::{CartStore, Deadline, SessionStore};

/// Credentials as presented by the client, unvalidated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresentedCredentials {
    pub token: Option<String>,
    pub session_key: Option<String>,
}

/// Instruction to persist a newly minted session key on the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub key: SessionKey,
    pub max_age: Duration,
}

/// Outcome of [`IdentityResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub identity: Identity,
    pub session_cookie: Option<SessionCookie>,
}

/// Classifies requests and lazily creates guest sessions.
pub struct IdentityResolver {
    tokens: Arc<TokenService>,
    sessions: Arc<dyn SessionStore>,
    carts: Arc<dyn CartStore>,
    clock: Arc<dyn Clock>,
    session_ttl: Duration,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(
        tokens: Arc<TokenService>,
        sessions: Arc<dyn SessionStore>,
        carts: Arc<dyn CartStore>,
        clock: Arc<dyn Clock>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            tokens,
            sessions,
            carts,
            clock,
            session_ttl,
        }
    }

    /// Resolve the caller, creating a guest session when nothing usable was
    /// presented.
    #[instrument(skip_all)]
    pub async fn resolve(
        &self,
        credentials: &PresentedCredentials,
        deadline: Deadline,
    ) -> Resolution {
        if let Some(identity) = self.classify(credentials, deadline).await {
            return Resolution {
                identity,
                session_cookie: None,
            };
        }

        let key = SessionKey::generate();
        let created_at = self.clock.now();
        let expires_at = created_at + self.session_ttl;

        match deadline
            .bounded(
                "create_session",
                self.sessions.create_session(&key, created_at, expires_at),
            )
            .await
        {
            Ok(()) => {
                tracing::debug!(session = key.fingerprint(), "Guest session created");
            }
            Err(e) => {
                tracing::warn!(
                    session = key.fingerprint(),
                    error = %e,
                    "Failed to persist guest session"
                );
            }
        }

        Resolution {
            identity: Identity::Anonymous {
                session_key: key.clone(),
            },
            session_cookie: Some(SessionCookie {
                key,
                max_age: self.session_ttl,
            }),
        }
    }

    /// Classify presented credentials without creating anything.
    ///
    /// Returns `None` when neither a valid token nor a live session was
    /// presented.
    #[instrument(skip_all)]
    pub async fn classify(
        &self,
        credentials: &PresentedCredentials,
        deadline: Deadline,
    ) -> Option<Identity> {
        if let Some(token) = credentials.token.as_deref() {
            match self.tokens.validate(token, deadline).await {
                Ok(claims) => {
                    return Some(Identity::Authenticated {
                        user_id: claims.user_id,
                        email: claims.email,
                    });
                }
                Err(e) => tracing::debug!(error = %e, "Ignoring presented token"),
            }
        }

        let key = SessionKey::parse(credentials.session_key.as_deref()?).ok()?;
        match deadline
            .bounded("get_session", self.sessions.get_session(&key))
            .await
        {
            Ok(Some(session)) if session.is_live(self.clock.now()) => {
                Some(Identity::Anonymous { session_key: key })
            }
            Ok(_) => {
                tracing::debug!(session = key.fingerprint(), "Presented session is not live");
                None
            }
            Err(e) => {
                tracing::warn!(session = key.fingerprint(), error = %e, "Session lookup failed");
                None
            }
        }
    }

    /// Number of items in the caller's cart, for the header badge.
    ///
    /// # Errors
    ///
    /// Returns `CartError::StorageFailure` if the count cannot be read.
    pub async fn cart_count(
        &self,
        identity: &Identity,
        deadline: Deadline,
    ) -> Result<u64, CartError> {
        let owner = identity.owner_key();
        Ok(deadline
            .bounded("item_count", self.carts.item_count(&owner))
            .await?)
    }
}
