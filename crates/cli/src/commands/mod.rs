//! CLI command implementations.

pub mod app;
pub mod migrate;
pub mod session;
