//! Application registration.
//!
//! Every token names the application that issued it; its signing secret is
//! stored in `storefront.application`.
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `CS_APP_SECRET` - Optional signing secret, same as `--secret`

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use corner_shop_storefront::config::{ConfigError, get_database_url, validate_secret_strength};
use corner_shop_storefront::db::{PgStore, create_pool};
use corner_shop_storefront::store::{AccountStore, StoreError};

const GENERATED_SECRET_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum AppCommandError {
    #[error("Application name must not be empty")]
    EmptyName,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Signing secret bytes, and whether they were generated here.
struct ResolvedSecret {
    bytes: Vec<u8>,
    generated: bool,
}

fn resolve_secret(supplied: Option<&SecretString>) -> Result<ResolvedSecret, ConfigError> {
    if let Some(secret) = supplied {
        validate_secret_strength(secret.expose_secret(), "--secret")?;
        return Ok(ResolvedSecret {
            bytes: secret.expose_secret().as_bytes().to_vec(),
            generated: false,
        });
    }

    let mut bytes = vec![0u8; GENERATED_SECRET_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    Ok(ResolvedSecret {
        bytes,
        generated: true,
    })
}

/// Register a new application.
///
/// A generated secret is printed once, base64url encoded; it is not
/// recoverable afterwards.
///
/// # Errors
///
/// Returns `AppCommandError` if the name is empty, the supplied secret is
/// weak, or the database rejects the insert (including a duplicate name).
pub async fn create(name: &str, secret: Option<SecretString>) -> Result<(), AppCommandError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppCommandError::EmptyName);
    }
    let resolved = resolve_secret(secret.as_ref())?;

    dotenvy::dotenv().ok();
    let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
    let store = PgStore::new(create_pool(&database_url).await?);

    let app_id = store.create_app(name, &resolved.bytes).await?;
    tracing::info!(app_id = %app_id, name, "Application registered");

    #[allow(clippy::print_stdout)]
    {
        println!("app_id: {app_id}");
        if resolved.generated {
            println!("secret: {}", URL_SAFE_NO_PAD.encode(&resolved.bytes));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_random_secret() {
        let first = resolve_secret(None).unwrap();
        let second = resolve_secret(None).unwrap();
        assert!(first.generated);
        assert_eq!(first.bytes.len(), GENERATED_SECRET_BYTES);
        assert_ne!(first.bytes, second.bytes);
    }

    #[test]
    fn test_accepts_strong_secret() {
        let secret = SecretString::from("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6%d");
        let resolved = resolve_secret(Some(&secret)).unwrap();
        assert!(!resolved.generated);
        assert_eq!(resolved.bytes, secret.expose_secret().as_bytes());
    }

    #[test]
    fn test_rejects_placeholder_secret() {
        let secret = SecretString::from("changeme-changeme-changeme-changeme");
        assert!(matches!(
            resolve_secret(Some(&secret)),
            Err(ConfigError::InsecureSecret(_, _))
        ));
    }
}
