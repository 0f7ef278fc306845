//! Guest session maintenance.
//!
//! # Usage
//!
//! ```bash
//! cs-cli session purge
//! ```
//!
//! Deletes guest sessions whose `expires_at` has passed and the guest cart
//! lines left behind by them. Safe to run from cron while the storefront is
//! serving: an expired session can no longer be resolved, so nothing writes to
//! its cart.

use chrono::Utc;
use thiserror::Error;

use corner_shop_storefront::config::{ConfigError, get_database_url};
use corner_shop_storefront::db::{PgStore, create_pool};
use corner_shop_storefront::store::{SessionStore, StoreError};

#[derive(Debug, Error)]
pub enum SessionCommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Purge expired guest sessions and their carts.
///
/// # Errors
///
/// Returns `SessionCommandError` if the database URL is missing or the
/// delete fails.
pub async fn purge() -> Result<(), SessionCommandError> {
    dotenvy::dotenv().ok();
    let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
    let store = PgStore::new(create_pool(&database_url).await?);

    let purged = store.purge_expired_sessions(Utc::now()).await?;
    tracing::info!(purged, "Expired guest sessions purged");
    Ok(())
}
