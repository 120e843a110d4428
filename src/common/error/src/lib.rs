//! Error types and result aliases for hyperlens.
//!
//! Every crate in the workspace reports failures through [`LensError`]. The
//! variants follow the engine's failure taxonomy: construction, operation,
//! state and execution errors, plus wrappers for the libraries underneath.

mod error;

pub use error::{DEFAULT_DIAGNOSTIC_LINES, GenericError, LensError, LensResult};
