//! Store layer for hyperlens.
//!
//! This crate defines the query IR the engine speaks and the backends that
//! interpret it:
//!
//! - [`MemoryStore`]: in-memory reference store
//! - [`SqlStore`]: ClickHouse over its HTTP interface
//!
//! # Architecture
//!
//! - The engine builds [`Query`] and [`Statement`] values and never emits SQL
//! - Every call is labelled with a query id used in logs and error reports
//! - Results come back as one Arrow `RecordBatch` wrapped in a [`ResultSet`]
//!
//! ```rust,ignore
//! use hyperlens_store::{ColumnarStore, MemoryStore, Query, RowSource};
//!
//! let store = MemoryStore::new();
//! let rows = store
//!     .query(&Query::RowCount { entity, source: RowSource::Links { exact: true } }, "Row count")
//!     .await?
//!     .scalar_u64()?;
//! ```

mod predicate;
mod query;
mod result;
mod store;

pub mod memory;
pub mod sql;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use predicate::{CmpOp, Operand, Predicate, like_matches};
pub use query::{
    AggregateFn, AtomSource, AttributeScope, CollectionKind, Column, LabeledStatement, OrderKey,
    Projection, Query, RowSelection, RowSource, Selection, Statement,
};
pub use result::{ColumnType, QueryStats, ResultBuilder, ResultSet};
pub use store::ColumnarStore;

pub use memory::{MemoryStore, StateSnapshot};
pub use sql::{HttpTransport, SqlStore, SqlTransport};

use std::sync::Arc;

use common_config::{StoreBackend, StoreConfig};
use common_error::LensResult;

/// Open the store backend selected by `config`.
pub fn open_store(config: &StoreConfig) -> LensResult<Arc<dyn ColumnarStore>> {
    let store: Arc<dyn ColumnarStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::ClickHouse => Arc::new(SqlStore::connect(config)?),
    };
    log::info!("opened {} store", store.name());
    Ok(store)
}
