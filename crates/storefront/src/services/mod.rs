//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Password verification, registration and the token codec
//! - `identity` - Classifies each request as a guest or an account
//! - `cart` - Cart edits for the resolved caller
//! - `reconcile` - Folds a guest cart into the account cart on login
//! - `login` - Authentication plus reconciliation in one call
//! - `notify` - Post-registration notification queue

pub mod auth;
pub mod cart;
pub mod identity;
pub mod login;
pub mod notify;
pub mod reconcile;

pub use auth::{AuthError, AuthService, RegistrationError, TokenError, TokenService};
pub use cart::{CartError, CartService};
pub use identity::{IdentityResolver, PresentedCredentials, Resolution, SessionCookie};
pub use login::{LoginOutcome, LoginService};
pub use notify::{
    ChannelNotifier, LogSink, NotificationSink, RegistrationNotice, RegistrationNotifier,
};
pub use reconcile::{CartReconciler, ReconcileOutcome};
