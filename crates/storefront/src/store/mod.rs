//! Storage collaborator interfaces.
//!
//! The identity subsystem never talks to a database directly. It goes through
//! three narrow traits:
//!
//! - [`SessionStore`] - anonymous guest sessions
//! - [`CartStore`] - cart lines keyed by [`OwnerKey`]
//! - [`AccountStore`] - accounts and application signing secrets
//!
//! Two implementations ship with the crate: [`memory::InMemoryStore`] (tests,
//! local runs) and [`crate::db::PgStore`] (`PostgreSQL`).
//!
//! Every call made by a service is wrapped in a caller supplied [`Deadline`],
//! so a stalled store surfaces as [`StoreError::Timeout`] instead of hanging
//! the request.

pub mod memory;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::time::Instant;

use corner_shop_core::{AppId, Cart, Email, OwnerKey, ProductId, Quantity, SessionKey, UserId};

use crate::models::{Account, ApplicationSecret, Session};

pub use memory::InMemoryStore;

/// Errors reported by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unique constraint violated, or a compare-and-swap could not settle.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Stored data failed validation on the way out.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// The caller's deadline passed before the operation finished.
    #[error("{operation} timed out")]
    Timeout {
        /// Name of the store operation that was cut off.
        operation: &'static str,
    },

    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Absolute point in time by which a store call must complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    /// A deadline `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    /// Run a store operation, failing with [`StoreError::Timeout`] if the
    /// deadline passes first. The future is dropped on expiry.
    ///
    /// # Errors
    ///
    /// Returns the operation's own error, or `Timeout`.
    pub async fn bounded<T, F>(self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout_at(self.0, fut)
            .await
            .map_err(|_| StoreError::Timeout { operation })?
    }
}

/// Result of [`CartStore::commit_merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeCommit {
    /// The merged cart was written and the guest cart deleted.
    Committed,
    /// One of the carts changed since the snapshots were read. Nothing was
    /// written.
    Stale,
}

/// Anonymous session persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session.
    async fn create_session(
        &self,
        key: &SessionKey,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Fetch a session, whether or not it has expired.
    async fn get_session(&self, key: &SessionKey) -> Result<Option<Session>, StoreError>;

    /// Make a session unusable. Invalidating an unknown key is not an error.
    async fn invalidate_session(&self, key: &SessionKey) -> Result<(), StoreError>;

    /// Delete sessions that expired at or before `now`, together with any
    /// guest cart lines whose session no longer exists. Returns the number of
    /// sessions removed.
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Cart persistence keyed by [`OwnerKey`].
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Read a cart. An owner without lines has an empty cart.
    async fn get_cart(&self, owner: &OwnerKey) -> Result<Cart, StoreError>;

    /// Overwrite a cart with exactly `cart`.
    async fn replace_cart(&self, owner: &OwnerKey, cart: &Cart) -> Result<(), StoreError>;

    async fn delete_cart(&self, owner: &OwnerKey) -> Result<(), StoreError>;

    /// Additive upsert: adds `quantity` to any existing line.
    async fn add_item(
        &self,
        owner: &OwnerKey,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), StoreError>;

    /// Set a line's quantity. Zero removes the line.
    async fn set_quantity(
        &self,
        owner: &OwnerKey,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), StoreError>;

    async fn remove_item(&self, owner: &OwnerKey, product_id: ProductId)
    -> Result<(), StoreError>;

    /// Sum of all line quantities.
    async fn item_count(&self, owner: &OwnerKey) -> Result<u64, StoreError>;

    /// Atomically write `merged` under `account` and delete the cart under
    /// `guest`, provided both carts still equal the given snapshots.
    ///
    /// Either both effects happen ([`MergeCommit::Committed`]) or neither
    /// does ([`MergeCommit::Stale`] or an error).
    async fn commit_merge(
        &self,
        guest: &OwnerKey,
        account: &OwnerKey,
        expected_guest: &Cart,
        expected_account: &Cart,
        merged: &Cart,
    ) -> Result<MergeCommit, StoreError>;
}

/// Account and application secret persistence.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn lookup_account(&self, email: &Email) -> Result<Option<Account>, StoreError>;

    /// Create an account. Fails with [`StoreError::Conflict`] if the email is
    /// taken; the existing account is left untouched.
    async fn create_account(&self, email: &Email, password_hash: &str)
    -> Result<UserId, StoreError>;

    async fn lookup_app_secret(
        &self,
        app_id: AppId,
    ) -> Result<Option<ApplicationSecret>, StoreError>;

    /// Register an application and its signing secret.
    async fn create_app(&self, name: &str, secret: &[u8]) -> Result<AppId, StoreError>;

    /// Cheap connectivity check used by the readiness probe.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
