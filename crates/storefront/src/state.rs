//! Application state shared across handlers.

use std::sync::Arc;

use corner_shop_core::{Clock, SystemClock};

use crate::config::StorefrontConfig;
use crate::services::{
    AuthService, CartReconciler, CartService, IdentityResolver, LoginService,
    RegistrationNotifier, TokenService,
};
use crate::store::{AccountStore, CartStore, Deadline, SessionStore};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the stores, the services built on them, and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    accounts: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    auth: Arc<AuthService>,
    identity: IdentityResolver,
    cart: CartService,
    login: LoginService,
    notifier: Arc<dyn RegistrationNotifier>,
}

impl AppState {
    /// Wire every service onto a single store implementation.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `store` - Backs accounts, sessions and carts
    /// * `notifier` - Receives a notice for each new registration
    #[must_use]
    pub fn new<S>(
        config: StorefrontConfig,
        store: Arc<S>,
        notifier: Arc<dyn RegistrationNotifier>,
    ) -> Self
    where
        S: AccountStore + SessionStore + CartStore + 'static,
    {
        Self::with_clock(config, store, notifier, Arc::new(SystemClock))
    }

    /// Like [`AppState::new`] with an injected clock.
    #[must_use]
    pub fn with_clock<S>(
        config: StorefrontConfig,
        store: Arc<S>,
        notifier: Arc<dyn RegistrationNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        S: AccountStore + SessionStore + CartStore + 'static,
    {
        let accounts: Arc<dyn AccountStore> = store.clone();
        let sessions: Arc<dyn SessionStore> = store.clone();
        let carts: Arc<dyn CartStore> = store;

        let tokens = Arc::new(TokenService::new(
            accounts.clone(),
            clock.clone(),
            config.token_ttl,
        ));
        let auth = Arc::new(AuthService::new(accounts.clone(), tokens.clone()));
        let identity = IdentityResolver::new(
            tokens,
            sessions.clone(),
            carts.clone(),
            clock.clone(),
            config.session_ttl,
        );
        let reconciler = Arc::new(CartReconciler::new(carts.clone(), sessions));
        let login = LoginService::new(auth.clone(), reconciler);
        let cart = CartService::new(carts);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                accounts,
                clock,
                auth,
                identity,
                cart,
                login,
                notifier,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Fresh deadline for one request's store calls.
    #[must_use]
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.inner.config.store_timeout)
    }

    #[must_use]
    pub fn accounts(&self) -> &Arc<dyn AccountStore> {
        &self.inner.accounts
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }

    #[must_use]
    pub fn identity(&self) -> &IdentityResolver {
        &self.inner.identity
    }

    #[must_use]
    pub fn cart(&self) -> &CartService {
        &self.inner.cart
    }

    #[must_use]
    pub fn login(&self) -> &LoginService {
        &self.inner.login
    }

    #[must_use]
    pub fn notifier(&self) -> &dyn RegistrationNotifier {
        self.inner.notifier.as_ref()
    }
}
