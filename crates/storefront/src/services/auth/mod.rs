//! Authentication service.
//!
//! Password login and registration for storefront accounts, plus the token
//! codec used to carry an authenticated identity between requests.

mod error;
pub mod password;
pub mod token;

pub use error::{AuthError, RegistrationError};
pub use password::HashError;
pub use token::{
    ClaimsInput, MintError, Token, TokenError, TokenService, UnverifiedToken, VerifiedClaims,
};

use std::sync::Arc;

use tracing::instrument;

use corner_shop_core::{AppId, Email, UserId};

use crate::store::{AccountStore, Deadline};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Authentication service.
///
/// Verifies credentials against the account store and mints tokens through
/// the [`TokenService`].
pub struct AuthService {
    accounts: Arc<dyn AccountStore>,
    tokens: Arc<TokenService>,
}

impl AuthService {
    /// Create a new authentication service.
    #[must_use]
    pub fn new(accounts: Arc<dyn AccountStore>, tokens: Arc<TokenService>) -> Self {
        Self { accounts, tokens }
    }

    /// Authenticate with email and password and mint a token for `app_id`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if no account has this email.
    /// Returns `AuthError::InvalidCredentials` if the password is wrong.
    /// Returns `AuthError::AppNotFound` if `app_id` is not registered.
    /// Returns `AuthError::Internal` for storage, hashing or minting failures.
    #[instrument(skip(self, email, password, deadline), fields(app_id = %app_id))]
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
        app_id: AppId,
        deadline: Deadline,
    ) -> Result<Token, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::UserNotFound)?;

        let account = deadline
            .bounded("lookup_account", self.accounts.lookup_account(&email))
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let submitted = password.to_owned();
        let stored = account.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || password::verify(&submitted, &stored))
            .await
            .map_err(|e| AuthError::Internal(format!("password verification task failed: {e}")))??;
        if !matches {
            tracing::info!(user_id = %account.user_id, "Password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let secret = self
            .tokens
            .secret_for(app_id, deadline)
            .await?
            .ok_or(AuthError::AppNotFound)?;

        let token = self.tokens.issue(
            &ClaimsInput {
                user_id: account.user_id,
                email: account.email,
                app_id,
            },
            &secret,
        )?;

        tracing::info!(user_id = %account.user_id, "Account authenticated");
        Ok(token)
    }

    /// Register a new account with email and password.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::InvalidEmail` if the email format is invalid.
    /// Returns `RegistrationError::WeakPassword` if the password is too short.
    /// Returns `RegistrationError::AlreadyExists` if the email is taken.
    /// Returns `RegistrationError::Internal` for storage or hashing failures.
    #[instrument(skip(self, email, password, deadline))]
    pub async fn register_account(
        &self,
        email: &str,
        password: &str,
        deadline: Deadline,
    ) -> Result<UserId, RegistrationError> {
        let email = Email::parse(email)?;
        validate_password(password)?;

        let submitted = password.to_owned();
        let password_hash = tokio::task::spawn_blocking(move || password::hash(&submitted))
            .await
            .map_err(|e| {
                RegistrationError::Internal(format!("password hashing task failed: {e}"))
            })??;

        let user_id = deadline
            .bounded(
                "create_account",
                self.accounts.create_account(&email, &password_hash),
            )
            .await?;

        tracing::info!(user_id = %user_id, "Account registered");
        Ok(user_id)
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), RegistrationError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(RegistrationError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::Duration;
    use corner_shop_core::SystemClock;

    use super::*;
    use crate::store::InMemoryStore;

    fn deadline() -> Deadline {
        Deadline::after(StdDuration::from_secs(5))
    }

    async fn setup() -> (Arc<InMemoryStore>, Arc<TokenService>, AuthService, AppId) {
        let store = Arc::new(InMemoryStore::new());
        let app_id = store
            .create_app("web", b"unit-test-signing-key-0123456789")
            .await
            .unwrap();
        let tokens = Arc::new(TokenService::new(
            store.clone(),
            Arc::new(SystemClock),
            Duration::hours(72),
        ));
        let auth = AuthService::new(store.clone(), tokens.clone());
        (store, tokens, auth, app_id)
    }

    #[tokio::test]
    async fn test_register_then_authenticate() {
        let (_, tokens, auth, app_id) = setup().await;
        let user_id = auth
            .register_account("Shopper@Example.com", "long-enough", deadline())
            .await
            .unwrap();

        let token = auth
            .authenticate("shopper@example.com", "long-enough", app_id, deadline())
            .await
            .unwrap();
        let claims = tokens.validate(token.as_str(), deadline()).await.unwrap();
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.email.as_str(), "shopper@example.com");
    }

    #[tokio::test]
    async fn test_wrong_password_is_invalid_credentials() {
        let (_, _, auth, app_id) = setup().await;
        auth.register_account("a@b.c", "long-enough", deadline())
            .await
            .unwrap();
        let err = auth
            .authenticate("a@b.c", "not-the-password", app_id, deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_unknown_email_is_user_not_found() {
        let (_, _, auth, app_id) = setup().await;
        let err = auth
            .authenticate("ghost@example.com", "whatever1", app_id, deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn test_unknown_app_is_app_not_found() {
        let (_, _, auth, _) = setup().await;
        auth.register_account("a@b.c", "long-enough", deadline())
            .await
            .unwrap();
        let err = auth
            .authenticate("a@b.c", "long-enough", AppId::new(404), deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AppNotFound));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (_, _, auth, _) = setup().await;
        assert!(matches!(
            auth.register_account("nope", "long-enough", deadline()).await,
            Err(RegistrationError::InvalidEmail(_))
        ));
        assert!(matches!(
            auth.register_account("a@b.c", "short", deadline()).await,
            Err(RegistrationError::WeakPassword(_))
        ));
    }

    #[tokio::test]
    async fn test_store_failure_is_internal() {
        let (store, _, auth, app_id) = setup().await;
        store.fail_next("lookup_account");
        let err = auth
            .authenticate("a@b.c", "long-enough", app_id, deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
    }
}
