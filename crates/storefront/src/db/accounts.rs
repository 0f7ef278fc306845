//! Account and application queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;
use tracing::instrument;

use corner_shop_core::{AppId, Email, UserId};

use super::{PgStore, conflict_on_unique};
use crate::models::{Account, ApplicationSecret};
use crate::store::{AccountStore, StoreError};

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    let email: String = row.try_get("email")?;
    let email = Email::parse(&email)
        .map_err(|e| StoreError::DataCorruption(format!("stored email is invalid: {e}")))?;
    Ok(Account {
        user_id: row.try_get("id")?,
        email,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[async_trait]
impl AccountStore for PgStore {
    #[instrument(skip(self, email))]
    async fn lookup_account(&self, email: &Email) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT id, email, password_hash, created_at
            FROM storefront.account
            WHERE email = $1
            ",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    #[instrument(skip(self, email, password_hash))]
    async fn create_account(
        &self,
        email: &Email,
        password_hash: &str,
    ) -> Result<UserId, StoreError> {
        let row = sqlx::query(
            r"
            INSERT INTO storefront.account (email, password_hash)
            VALUES ($1, $2)
            RETURNING id
            ",
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "account"))?;

        Ok(row.try_get("id")?)
    }

    #[instrument(skip(self), fields(app_id = %app_id))]
    async fn lookup_app_secret(
        &self,
        app_id: AppId,
    ) -> Result<Option<ApplicationSecret>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT id, name, secret
            FROM storefront.application
            WHERE id = $1
            ",
        )
        .bind(app_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let secret: Vec<u8> = row.try_get("secret")?;
        if secret.is_empty() {
            return Err(StoreError::DataCorruption(format!(
                "application {app_id} has an empty secret"
            )));
        }
        Ok(Some(ApplicationSecret::new(
            row.try_get("id")?,
            row.try_get::<String, _>("name")?,
            secret,
        )))
    }

    #[instrument(skip(self, secret))]
    async fn create_app(&self, name: &str, secret: &[u8]) -> Result<AppId, StoreError> {
        let row = sqlx::query(
            r"
            INSERT INTO storefront.application (name, secret)
            VALUES ($1, $2)
            RETURNING id
            ",
        )
        .bind(name)
        .bind(secret)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "application"))?;

        Ok(row.try_get("id")?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
