//! Cart route handlers.
//!
//! Every handler acts on the cart of the identity resolved for the request:
//! the account cart when a valid token is presented, the guest session's
//! cart otherwise.

use axum::{Form, Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use corner_shop_core::{CartLine, Identity, ProductId, Quantity};

use crate::error::{AppError, Result};
use crate::middleware::CurrentIdentity;
use crate::state::AppState;

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub product_id: i64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

const fn default_quantity() -> u32 {
    1
}

/// Update cart line form data. A quantity of zero removes the line.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub product_id: i64,
    pub quantity: u32,
}

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub product_id: i64,
}

/// Cart contents as returned to the client.
#[derive(Debug, Serialize, Deserialize)]
pub struct CartView {
    /// `session` or `user`.
    pub owner: String,
    pub lines: Vec<CartLine>,
    pub item_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CartCount {
    pub count: u64,
}

async fn view(state: &AppState, identity: &Identity) -> Result<CartView> {
    let cart = state.cart().view(identity, state.deadline()).await?;
    Ok(CartView {
        owner: identity.owner_key().kind().as_str().to_string(),
        item_count: cart.item_count(),
        lines: cart.into(),
    })
}

/// Show the resolved owner's cart.
#[instrument(skip(state, identity))]
pub async fn show(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<Json<CartView>> {
    Ok(Json(view(&state, &identity).await?))
}

/// Add a product, on top of any quantity already in the cart.
#[instrument(skip(state, identity, form), fields(product_id = form.product_id))]
pub async fn add(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Form(form): Form<AddToCartForm>,
) -> Result<Json<CartView>> {
    let quantity = Quantity::new(form.quantity)
        .ok_or_else(|| AppError::BadRequest("Quantity must be at least 1".to_string()))?;
    state
        .cart()
        .add(
            &identity,
            ProductId::new(form.product_id),
            quantity,
            state.deadline(),
        )
        .await?;
    Ok(Json(view(&state, &identity).await?))
}

/// Set a line's quantity.
#[instrument(skip(state, identity, form), fields(product_id = form.product_id))]
pub async fn update(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Form(form): Form<UpdateCartForm>,
) -> Result<Json<CartView>> {
    state
        .cart()
        .update(
            &identity,
            ProductId::new(form.product_id),
            form.quantity,
            state.deadline(),
        )
        .await?;
    Ok(Json(view(&state, &identity).await?))
}

#[instrument(skip(state, identity, form), fields(product_id = form.product_id))]
pub async fn remove(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Form(form): Form<RemoveFromCartForm>,
) -> Result<Json<CartView>> {
    state
        .cart()
        .remove(&identity, ProductId::new(form.product_id), state.deadline())
        .await?;
    Ok(Json(view(&state, &identity).await?))
}

/// Cart badge count.
#[instrument(skip(state, identity))]
pub async fn count(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<Json<CartCount>> {
    let count = state
        .identity()
        .cart_count(&identity, state.deadline())
        .await?;
    Ok(Json(CartCount { count }))
}
