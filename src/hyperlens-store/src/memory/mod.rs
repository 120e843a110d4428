//! In-memory reference store.
//!
//! Holds the hyperatom dictionaries, the incidence rows, the states table and
//! the session memory tables of any number of data models, and interprets the
//! store IR against them with the semantics the ClickHouse renderer produces.
//!
//! # Usage
//!
//! ```rust,ignore
//! let store = MemoryStore::new();
//! store.insert_row(supplier, 1, &[(country, Value::from("Brazil"))]).await?;
//! let result = store.query(&query, "Counting").await?;
//! ```

mod eval;
mod state;
mod store;

pub use store::{MemoryStore, StateSnapshot};
