//! Login orchestration.
//!
//! Authenticates, mints the token, and folds the caller's guest cart into
//! their account. A cart failure is reported alongside the successful login;
//! it never turns a correct password into a failed login.

use std::sync::Arc;

use tracing::instrument;

use corner_shop_core::{AppId, Identity};

use crate::services::auth::{AuthError, AuthService, Token};
use crate::services::cart::CartError;
use crate::services::reconcile::{CartReconciler, ReconcileOutcome};
use crate::store::Deadline;

/// Result of a successful login.
#[derive(Debug)]
pub struct LoginOutcome {
    /// Token to hand to the client.
    pub token: Token,
    /// The caller's new identity.
    pub identity: Identity,
    /// What happened to the guest cart.
    pub merge: Result<ReconcileOutcome, CartError>,
    /// Whether the client should drop its guest session cookie. False when
    /// the merge failed.
    pub clear_session_cookie: bool,
}

impl LoginOutcome {
    /// Whether guest lines were moved into the account cart.
    #[must_use]
    pub const fn cart_merged(&self) -> bool {
        matches!(self.merge, Ok(ReconcileOutcome::Merged { .. }))
    }
}

pub struct LoginService {
    auth: Arc<AuthService>,
    reconciler: Arc<CartReconciler>,
}

impl LoginService {
    #[must_use]
    pub fn new(auth: Arc<AuthService>, reconciler: Arc<CartReconciler>) -> Self {
        Self { auth, reconciler }
    }

    /// Log in from `prior`, the identity resolved for this request.
    ///
    /// # Errors
    ///
    /// Returns the `AuthError` from authentication. Cart reconciliation
    /// errors are returned inside [`LoginOutcome::merge`] instead.
    #[instrument(skip(self, prior, email, password, deadline), fields(app_id = %app_id))]
    pub async fn login(
        &self,
        prior: &Identity,
        email: &str,
        password: &str,
        app_id: AppId,
        deadline: Deadline,
    ) -> Result<LoginOutcome, AuthError> {
        let token = self
            .auth
            .authenticate(email, password, app_id, deadline)
            .await?;

        let claims = token.claims();
        let identity = Identity::Authenticated {
            user_id: claims.user_id,
            email: claims.email.clone(),
        };

        let merge = self
            .reconciler
            .reconcile_on_login(prior, &identity, deadline)
            .await;
        if let Err(e) = &merge {
            tracing::warn!(user_id = %claims.user_id, error = %e, "Cart reconciliation failed");
        }

        // A failed merge keeps the guest session so the cart stays reachable.
        Ok(LoginOutcome {
            clear_session_cookie: matches!(prior, Identity::Anonymous { .. }) && merge.is_ok(),
            token,
            identity,
            merge,
        })
    }
}
