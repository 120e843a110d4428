//! Hyperlens - associative filtering over an analytical columnar store
//!
//! Hyperlens keeps, for every entity of a data model, the rows still
//! compatible with the user's value selections, and propagates each new
//! selection to every entity reachable through shared junction attributes.

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

// Re-export core crates
pub use common_config as config;
pub use common_error as error;
pub use hyperlens_core as core;
pub use hyperlens_engine as engine;
pub use hyperlens_store as store;

/// Hyperlens version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
