//! Columnar store interface.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use common_error::LensResult;

use crate::query::{Query, Statement};
use crate::result::{QueryStats, ResultSet};

/// Trait for analytical store backends.
///
/// Every call carries a `query_id` label that identifies the query in logs
/// and in the `Execution` error raised when the store rejects it.
#[async_trait]
pub trait ColumnarStore: Send + Sync + Debug {
    /// Short backend name.
    fn name(&self) -> &'static str;

    /// Run a read query.
    async fn query(&self, query: &Query, query_id: &str) -> LensResult<ResultSet>;

    /// Run a write statement.
    async fn execute(&self, statement: &Statement, query_id: &str) -> LensResult<QueryStats>;
}

#[async_trait]
impl<S: ColumnarStore + ?Sized> ColumnarStore for Arc<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn query(&self, query: &Query, query_id: &str) -> LensResult<ResultSet> {
        (**self).query(query, query_id).await
    }

    async fn execute(&self, statement: &Statement, query_id: &str) -> LensResult<QueryStats> {
        (**self).execute(statement, query_id).await
    }
}
