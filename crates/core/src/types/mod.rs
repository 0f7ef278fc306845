//! Core types for Corner Shop.
//!
//! This module provides type-safe wrappers for the identity and cart domain.

pub mod cart;
pub mod email;
pub mod id;
pub mod identity;
pub mod owner;
pub mod session_key;

pub use cart::{Cart, CartLine, Quantity};
pub use email::{Email, EmailError};
pub use id::*;
pub use identity::Identity;
pub use owner::{OwnerKey, OwnerKind};
pub use session_key::{SessionKey, SessionKeyError};
