//! Cart operations for the resolved caller.

use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use corner_shop_core::{Cart, Identity, ProductId, Quantity};

use crate::store::{CartStore, Deadline, StoreError};

/// Errors from cart operations and reconciliation.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("cart storage failure: {0}")]
    StorageFailure(#[from] StoreError),
}

/// Reads and edits the cart owned by an [`Identity`].
pub struct CartService {
    carts: Arc<dyn CartStore>,
}

impl CartService {
    #[must_use]
    pub fn new(carts: Arc<dyn CartStore>) -> Self {
        Self { carts }
    }

    /// # Errors
    ///
    /// Returns `CartError::StorageFailure` if the store fails.
    pub async fn view(&self, identity: &Identity, deadline: Deadline) -> Result<Cart, CartError> {
        let owner = identity.owner_key();
        Ok(deadline.bounded("get_cart", self.carts.get_cart(&owner)).await?)
    }

    /// Add `quantity` of a product on top of what is already in the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::StorageFailure` if the store fails.
    #[instrument(skip(self, identity, deadline), fields(owner = %identity.owner_key()))]
    pub async fn add(
        &self,
        identity: &Identity,
        product_id: ProductId,
        quantity: Quantity,
        deadline: Deadline,
    ) -> Result<(), CartError> {
        let owner = identity.owner_key();
        deadline
            .bounded(
                "add_item",
                self.carts.add_item(&owner, product_id, quantity),
            )
            .await?;
        Ok(())
    }

    /// Set a line's quantity; zero removes it.
    ///
    /// # Errors
    ///
    /// Returns `CartError::StorageFailure` if the store fails.
    #[instrument(skip(self, identity, deadline), fields(owner = %identity.owner_key()))]
    pub async fn update(
        &self,
        identity: &Identity,
        product_id: ProductId,
        quantity: u32,
        deadline: Deadline,
    ) -> Result<(), CartError> {
        let owner = identity.owner_key();
        deadline
            .bounded(
                "set_quantity",
                self.carts.set_quantity(&owner, product_id, quantity),
            )
            .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `CartError::StorageFailure` if the store fails.
    #[instrument(skip(self, identity, deadline), fields(owner = %identity.owner_key()))]
    pub async fn remove(
        &self,
        identity: &Identity,
        product_id: ProductId,
        deadline: Deadline,
    ) -> Result<(), CartError> {
        let owner = identity.owner_key();
        deadline
            .bounded("remove_item", self.carts.remove_item(&owner, product_id))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use corner_shop_core::{SessionKey, UserId};

    use super::*;
    use crate::store::InMemoryStore;

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_add_update_remove() {
        let service = CartService::new(Arc::new(InMemoryStore::new()));
        let guest = Identity::Anonymous {
            session_key: SessionKey::generate(),
        };
        let product = ProductId::new(10);

        service
            .add(&guest, product, Quantity::new(2).unwrap(), deadline())
            .await
            .unwrap();
        service
            .add(&guest, product, Quantity::ONE, deadline())
            .await
            .unwrap();
        let cart = service.view(&guest, deadline()).await.unwrap();
        assert_eq!(cart.quantity_of(product).unwrap().get(), 3);

        service.update(&guest, product, 5, deadline()).await.unwrap();
        assert_eq!(service.view(&guest, deadline()).await.unwrap().item_count(), 5);

        service.remove(&guest, product, deadline()).await.unwrap();
        assert!(service.view(&guest, deadline()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_maps_to_storage_failure() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_next("get_cart");
        let service = CartService::new(store);
        let user = Identity::Authenticated {
            user_id: UserId::new(1),
            email: corner_shop_core::Email::parse("a@b.c").unwrap(),
        };
        assert!(matches!(
            service.view(&user, deadline()).await,
            Err(CartError::StorageFailure(StoreError::Unavailable(_)))
        ));
    }
}
