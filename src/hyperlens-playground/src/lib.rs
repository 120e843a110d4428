//! Hyperlens Playground - Experiments and Examples
//!
//! This crate provides a demo dataset and an executable for experimenting
//! with associative filtering.
//!
//! # Available Binaries
//!
//! - **`filter-demo`**: counts, ranked value listings, filter passes and
//!   propagation trees over the suppliers and parts model
//!
//! # Usage
//!
//! ```bash
//! cargo run --package hyperlens-playground --bin filter-demo -- --help
//! cargo run --package hyperlens-playground --bin filter-demo -- filter country --values Brazil
//! ```

pub mod data;
pub mod utils;

pub use data::{DEMO_MODEL, DemoModel, create_supply_model, demo_catalog};
pub use utils::{format_counts, format_report, print_divider, print_header, print_results};
