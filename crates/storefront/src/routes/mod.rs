//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness
//! GET  /health/ready           - Store readiness
//!
//! # Auth
//! POST /auth/login             - Login, sets auth_token, merges guest cart
//! POST /auth/register          - Create an account
//! POST /auth/logout            - Clear auth_token
//!
//! # Cart
//! GET  /cart                   - Cart of the resolved owner
//! POST /cart/add               - Add to cart (additive)
//! POST /cart/update            - Set quantity (0 removes)
//! POST /cart/remove            - Remove line
//! GET  /cart/count             - Cart count badge
//! ```

pub mod auth;
pub mod cart;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/logout", post(auth::logout))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/count", get(cart::count))
}

/// Routes that resolve an identity for each request.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/cart", cart_routes())
        .nest("/auth", auth_routes())
}

/// Liveness probe.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness probe: the store must answer within the request deadline.
pub async fn ready(State(state): State<AppState>) -> StatusCode {
    match state
        .deadline()
        .bounded("ping", state.accounts().ping())
        .await
    {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
