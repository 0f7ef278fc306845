//! Corner Shop Core - Shared domain types.
//!
//! This crate provides the value types used by every Corner Shop component:
//! - `storefront` - Identity resolution, token lifecycle and cart reconciliation
//! - `cli` - Operator tooling (migrations, application registration)
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, emails, session keys, owner keys, carts and identities
//! - [`clock`] - Injectable wall clock for expiry decisions

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod clock;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use types::*;
