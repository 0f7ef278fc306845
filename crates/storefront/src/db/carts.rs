//! Cart line queries.
//!
//! Each write runs in a transaction that first takes
//! `pg_advisory_xact_lock` on the owner. `commit_merge` locks both owners
//! (guest first, then account) before comparing snapshots, so nothing can
//! slip into either cart between the comparison and the write.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgExecutor, Row};
use tracing::instrument;

use corner_shop_core::{Cart, CartLine, OwnerKey, ProductId, Quantity};

use super::PgStore;
use crate::store::{CartStore, MergeCommit, StoreError};

async fn lock_owner(conn: &mut PgConnection, owner: &OwnerKey) -> Result<(), StoreError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1 || ':' || $2, 0))")
        .bind(owner.kind().as_str())
        .bind(owner.storage_key())
        .execute(conn)
        .await?;
    Ok(())
}

fn line_from_row(row: &PgRow) -> Result<CartLine, StoreError> {
    let product_id: ProductId = row.try_get("product_id")?;
    let raw: i64 = row.try_get("quantity")?;
    let quantity = u32::try_from(raw)
        .ok()
        .and_then(Quantity::new)
        .ok_or_else(|| {
            StoreError::DataCorruption(format!("cart line {product_id} has quantity {raw}"))
        })?;
    Ok(CartLine {
        product_id,
        quantity,
    })
}

async fn read_cart<'e, E: PgExecutor<'e>>(executor: E, owner: &OwnerKey) -> Result<Cart, StoreError> {
    let rows = sqlx::query(
        r"
        SELECT product_id, quantity
        FROM storefront.cart_line
        WHERE owner_kind = $1 AND owner_key = $2
        ORDER BY product_id
        ",
    )
    .bind(owner.kind().as_str())
    .bind(owner.storage_key())
    .fetch_all(executor)
    .await?;

    rows.iter().map(line_from_row).collect()
}

async fn delete_lines(conn: &mut PgConnection, owner: &OwnerKey) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM storefront.cart_line WHERE owner_kind = $1 AND owner_key = $2")
        .bind(owner.kind().as_str())
        .bind(owner.storage_key())
        .execute(conn)
        .await?;
    Ok(())
}

async fn insert_lines(
    conn: &mut PgConnection,
    owner: &OwnerKey,
    cart: &Cart,
) -> Result<(), StoreError> {
    if cart.is_empty() {
        return Ok(());
    }
    let (products, quantities): (Vec<i64>, Vec<i64>) = cart
        .lines()
        .map(|line| (line.product_id.get(), i64::from(line.quantity.get())))
        .unzip();

    sqlx::query(
        r"
        INSERT INTO storefront.cart_line (owner_kind, owner_key, product_id, quantity)
        SELECT $1, $2, product_id, quantity
        FROM UNNEST($3::BIGINT[], $4::BIGINT[]) AS line(product_id, quantity)
        ",
    )
    .bind(owner.kind().as_str())
    .bind(owner.storage_key())
    .bind(products)
    .bind(quantities)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl CartStore for PgStore {
    #[instrument(skip(self), fields(owner = %owner))]
    async fn get_cart(&self, owner: &OwnerKey) -> Result<Cart, StoreError> {
        read_cart(&self.pool, owner).await
    }

    #[instrument(skip(self, cart), fields(owner = %owner, lines = cart.line_count()))]
    async fn replace_cart(&self, owner: &OwnerKey, cart: &Cart) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_owner(&mut tx, owner).await?;
        delete_lines(&mut tx, owner).await?;
        insert_lines(&mut tx, owner, cart).await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(owner = %owner))]
    async fn delete_cart(&self, owner: &OwnerKey) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_owner(&mut tx, owner).await?;
        delete_lines(&mut tx, owner).await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(owner = %owner, product_id = %product_id))]
    async fn add_item(
        &self,
        owner: &OwnerKey,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_owner(&mut tx, owner).await?;
        // Saturates at u32::MAX like `Quantity::saturating_add`.
        sqlx::query(
            r"
            INSERT INTO storefront.cart_line (owner_kind, owner_key, product_id, quantity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (owner_kind, owner_key, product_id) DO UPDATE
            SET quantity = LEAST(storefront.cart_line.quantity + EXCLUDED.quantity, 4294967295),
                updated_at = now()
            ",
        )
        .bind(owner.kind().as_str())
        .bind(owner.storage_key())
        .bind(product_id)
        .bind(i64::from(quantity.get()))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(owner = %owner, product_id = %product_id))]
    async fn set_quantity(
        &self,
        owner: &OwnerKey,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<(), StoreError> {
        let Some(quantity) = Quantity::new(quantity) else {
            return self.remove_item(owner, product_id).await;
        };

        let mut tx = self.pool.begin().await?;
        lock_owner(&mut tx, owner).await?;
        sqlx::query(
            r"
            INSERT INTO storefront.cart_line (owner_kind, owner_key, product_id, quantity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (owner_kind, owner_key, product_id) DO UPDATE
            SET quantity = EXCLUDED.quantity,
                updated_at = now()
            ",
        )
        .bind(owner.kind().as_str())
        .bind(owner.storage_key())
        .bind(product_id)
        .bind(i64::from(quantity.get()))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(owner = %owner, product_id = %product_id))]
    async fn remove_item(
        &self,
        owner: &OwnerKey,
        product_id: ProductId,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_owner(&mut tx, owner).await?;
        sqlx::query(
            r"
            DELETE FROM storefront.cart_line
            WHERE owner_kind = $1 AND owner_key = $2 AND product_id = $3
            ",
        )
        .bind(owner.kind().as_str())
        .bind(owner.storage_key())
        .bind(product_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(owner = %owner))]
    async fn item_count(&self, owner: &OwnerKey) -> Result<u64, StoreError> {
        let row = sqlx::query(
            r"
            SELECT COALESCE(SUM(quantity), 0)::BIGINT AS total
            FROM storefront.cart_line
            WHERE owner_kind = $1 AND owner_key = $2
            ",
        )
        .bind(owner.kind().as_str())
        .bind(owner.storage_key())
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = row.try_get("total")?;
        u64::try_from(total)
            .map_err(|_| StoreError::DataCorruption(format!("negative item count {total}")))
    }

    #[instrument(
        skip(self, expected_guest, expected_account, merged),
        fields(guest = %guest, account = %account)
    )]
    async fn commit_merge(
        &self,
        guest: &OwnerKey,
        account: &OwnerKey,
        expected_guest: &Cart,
        expected_account: &Cart,
        merged: &Cart,
    ) -> Result<MergeCommit, StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_owner(&mut tx, guest).await?;
        lock_owner(&mut tx, account).await?;

        let current_guest = read_cart(&mut *tx, guest).await?;
        let current_account = read_cart(&mut *tx, account).await?;
        if current_guest != *expected_guest || current_account != *expected_account {
            tx.rollback().await?;
            return Ok(MergeCommit::Stale);
        }

        delete_lines(&mut tx, guest).await?;
        delete_lines(&mut tx, account).await?;
        insert_lines(&mut tx, account, merged).await?;
        tx.commit().await?;
        Ok(MergeCommit::Committed)
    }
}
