//! Domain models for the storefront.
//!
//! These are validated domain objects, separate from database row types.

pub mod account;
pub mod application;
pub mod session;

pub use account::Account;
pub use application::ApplicationSecret;
pub use session::Session;
