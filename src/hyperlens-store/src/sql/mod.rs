//! ClickHouse backend.
//!
//! Queries are rendered to SQL, sent through a [`SqlTransport`] and read back
//! in the `TabSeparatedWithNamesAndTypes` format.

mod http;
mod render;
mod store;
mod tsv;

pub use http::{HttpTransport, RESPONSE_FORMAT, SqlResponse, SqlTransport, Summary};
pub use render::{literal, quote, render_predicate, render_query, render_statement};
pub use store::SqlStore;
pub use tsv::parse_tsv;
