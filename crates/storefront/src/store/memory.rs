//! In-memory store backend.
//!
//! Implements every store trait behind one mutex, so each call (including
//! `commit_merge`) is a single critical section. Not persistent; data is lost
//! on drop. Used by tests and by local runs without a database.
//!
//! Faults can be injected per operation name (`"get_cart"`,
//! `"commit_merge"`, ...) to exercise storage failure paths.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use corner_shop_core::{AppId, Cart, Email, OwnerKey, ProductId, Quantity, SessionKey, UserId};

use super::{AccountStore, CartStore, MergeCommit, SessionStore, StoreError};
use crate::models::{Account, ApplicationSecret, Session};

/// A fault to inject into a store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail with [`StoreError::Unavailable`].
    Unavailable,
    /// Never complete; only the caller's deadline ends the call.
    Stall,
    /// Report [`MergeCommit::Stale`] without writing. Only meaningful for
    /// `commit_merge`.
    Stale,
}

#[derive(Default)]
struct State {
    sessions: HashMap<SessionKey, Session>,
    carts: HashMap<OwnerKey, Cart>,
    accounts: HashMap<Email, Account>,
    last_user_id: i64,
    apps: HashMap<AppId, (String, Vec<u8>)>,
    last_app_id: i32,
}

/// Thread-safe in-memory implementation of all store traits.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    faults: Mutex<HashMap<&'static str, VecDeque<Option<Fault>>>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call to `operation`.
    pub fn fail_next(&self, operation: &'static str) {
        self.inject_after(operation, 0, Fault::Unavailable);
    }

    /// Let `passes` calls to `operation` through, then apply `fault` once.
    pub fn inject_after(&self, operation: &'static str, passes: usize, fault: Fault) {
        let mut faults = self.faults.lock();
        let queue = faults.entry(operation).or_default();
        queue.extend(std::iter::repeat_n(None, passes));
        queue.push_back(Some(fault));
    }

    /// Number of stored sessions, expired ones included.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Number of owners with a non-empty cart.
    #[must_use]
    pub fn cart_count(&self) -> usize {
        self.state.lock().carts.len()
    }

    fn take_fault(&self, operation: &'static str) -> Option<Fault> {
        self.faults
            .lock()
            .get_mut(operation)
            .and_then(VecDeque::pop_front)
            .flatten()
    }

    async fn check(&self, operation: &'static str) -> Result<Option<Fault>, StoreError> {
        match self.take_fault(operation) {
            Some(Fault::Unavailable) => Err(StoreError::Unavailable(format!(
                "injected failure in {operation}"
            ))),
            Some(Fault::Stall) => {
                std::future::pending::<()>().await;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn update_cart(&self, owner: &OwnerKey, f: impl FnOnce(&mut Cart)) {
        let mut state = self.state.lock();
        let cart = state.carts.entry(owner.clone()).or_default();
        f(cart);
        if cart.is_empty() {
            state.carts.remove(owner);
        }
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn create_session(
        &self,
        key: &SessionKey,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check("create_session").await?;
        let mut state = self.state.lock();
        if state.sessions.contains_key(key) {
            return Err(StoreError::Conflict("session key already exists".to_owned()));
        }
        state.sessions.insert(
            key.clone(),
            Session {
                key: key.clone(),
                created_at,
                expires_at,
            },
        );
        Ok(())
    }

    async fn get_session(&self, key: &SessionKey) -> Result<Option<Session>, StoreError> {
        self.check("get_session").await?;
        Ok(self.state.lock().sessions.get(key).cloned())
    }

    async fn invalidate_session(&self, key: &SessionKey) -> Result<(), StoreError> {
        self.check("invalidate_session").await?;
        self.state.lock().sessions.remove(key);
        Ok(())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.check("purge_expired_sessions").await?;
        let mut state = self.state.lock();
        let before = state.sessions.len();
        state.sessions.retain(|_, session| session.expires_at > now);
        let purged = before - state.sessions.len();

        let State {
            sessions, carts, ..
        } = &mut *state;
        carts.retain(|owner, _| match owner {
            OwnerKey::Session(key) => sessions.contains_key(key),
            OwnerKey::User(_) => true,
        });
        Ok(u64::try_from(purged).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn get_cart(&self, owner: &OwnerKey) -> Result<Cart, StoreError> {
        self.check("get_cart").await?;
        Ok(self
            .state
            .lock()
            .carts
            .get(owner)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_cart(&self, owner: &OwnerKey, cart: &Cart) -> Result<(), StoreError> {
        self.check("replace_cart").await?;
        self.update_cart(owner, |existing| existing.clone_from(cart));
        Ok(())
    }

    async fn delete_cart(&self, owner: &OwnerKey) -> Result<(), StoreError> {
        self.check("delete_cart").await?;
        self.state.lock().carts.remove(owner);
        Ok(())
    }

    async fn add_item(
        &self,
        owner: &OwnerKey,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), StoreError> {
        self.check("add_item").await?;
        self.update_cart(owner, |cart| cart.add(product_id, quantity));
        Ok(())
    }

    async fn set_quantity(
        &self,
        owner: &OwnerKey,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), StoreError> {
        self.check("set_quantity").await?;
        self.update_cart(owner, |cart| cart.set(product_id, quantity));
        Ok(())
    }

    async fn remove_item(
        &self,
        owner: &OwnerKey,
        product_id: ProductId,
    ) -> Result<(), StoreError> {
        self.check("remove_item").await?;
        self.update_cart(owner, |cart| {
            cart.remove(product_id);
        });
        Ok(())
    }

    async fn item_count(&self, owner: &OwnerKey) -> Result<u64, StoreError> {
        self.check("item_count").await?;
        Ok(self
            .state
            .lock()
            .carts
            .get(owner)
            .map_or(0, Cart::item_count))
    }

    async fn commit_merge(
        &self,
        guest: &OwnerKey,
        account: &OwnerKey,
        expected_guest: &Cart,
        expected_account: &Cart,
        merged: &Cart,
    ) -> Result<MergeCommit, StoreError> {
        if self.check("commit_merge").await? == Some(Fault::Stale) {
            return Ok(MergeCommit::Stale);
        }

        let mut state = self.state.lock();
        let empty = Cart::new();
        let current_guest = state.carts.get(guest).unwrap_or(&empty);
        let current_account = state.carts.get(account).unwrap_or(&empty);
        if current_guest != expected_guest || current_account != expected_account {
            return Ok(MergeCommit::Stale);
        }

        state.carts.remove(guest);
        if merged.is_empty() {
            state.carts.remove(account);
        } else {
            state.carts.insert(account.clone(), merged.clone());
        }
        Ok(MergeCommit::Committed)
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn lookup_account(&self, email: &Email) -> Result<Option<Account>, StoreError> {
        self.check("lookup_account").await?;
        Ok(self.state.lock().accounts.get(email).cloned())
    }

    async fn create_account(
        &self,
        email: &Email,
        password_hash: &str,
    ) -> Result<UserId, StoreError> {
        self.check("create_account").await?;
        let mut state = self.state.lock();
        if state.accounts.contains_key(email) {
            return Err(StoreError::Conflict("email already exists".to_owned()));
        }
        state.last_user_id += 1;
        let user_id = UserId::new(state.last_user_id);
        state.accounts.insert(
            email.clone(),
            Account {
                user_id,
                email: email.clone(),
                password_hash: password_hash.to_owned(),
                created_at: Utc::now(),
            },
        );
        Ok(user_id)
    }

    async fn lookup_app_secret(
        &self,
        app_id: AppId,
    ) -> Result<Option<ApplicationSecret>, StoreError> {
        self.check("lookup_app_secret").await?;
        Ok(self
            .state
            .lock()
            .apps
            .get(&app_id)
            .map(|(name, secret)| ApplicationSecret::new(app_id, name.clone(), secret.clone())))
    }

    async fn create_app(&self, name: &str, secret: &[u8]) -> Result<AppId, StoreError> {
        self.check("create_app").await?;
        let mut state = self.state.lock();
        state.last_app_id += 1;
        let app_id = AppId::new(state.last_app_id);
        state
            .apps
            .insert(app_id, (name.to_owned(), secret.to_vec()));
        Ok(app_id)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check("ping").await?;
        Ok(())
    }
}
