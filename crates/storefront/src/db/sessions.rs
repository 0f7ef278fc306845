//! Guest session queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::instrument;

use corner_shop_core::SessionKey;

use super::{PgStore, conflict_on_unique};
use crate::models::Session;
use crate::store::{SessionStore, StoreError};

#[async_trait]
impl SessionStore for PgStore {
    #[instrument(skip(self, key, created_at, expires_at), fields(session = %key.fingerprint()))]
    async fn create_session(
        &self,
        key: &SessionKey,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO storefront.guest_session (session_key, created_at, expires_at)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(key.as_str())
        .bind(created_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "session"))?;

        Ok(())
    }

    #[instrument(skip(self, key), fields(session = %key.fingerprint()))]
    async fn get_session(&self, key: &SessionKey) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT created_at, expires_at
            FROM storefront.guest_session
            WHERE session_key = $1
            ",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<Session, StoreError> {
            Ok(Session {
                key: key.clone(),
                created_at: row.try_get("created_at")?,
                expires_at: row.try_get("expires_at")?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self, key), fields(session = %key.fingerprint()))]
    async fn invalidate_session(&self, key: &SessionKey) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM storefront.guest_session WHERE session_key = $1")
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        // Data-modifying CTEs share one snapshot, so lines of sessions deleted
        // by `expired` are matched through its RETURNING list.
        let row = sqlx::query(
            r"
            WITH expired AS (
                DELETE FROM storefront.guest_session
                WHERE expires_at <= $1
                RETURNING session_key
            ),
            orphaned AS (
                DELETE FROM storefront.cart_line c
                WHERE c.owner_kind = 'session'
                  AND (
                      c.owner_key IN (SELECT session_key FROM expired)
                      OR NOT EXISTS (
                          SELECT 1 FROM storefront.guest_session s
                          WHERE s.session_key = c.owner_key
                      )
                  )
            )
            SELECT COUNT(*) AS purged FROM expired
            ",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let purged: i64 = row.try_get("purged")?;
        Ok(u64::try_from(purged).unwrap_or_default())
    }
}
