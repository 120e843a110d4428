//! `SqlStore` implementation.

use std::time::Instant;

use async_trait::async_trait;

use common_config::StoreConfig;
use common_error::LensResult;

use super::http::{HttpTransport, SqlResponse, SqlTransport};
use super::render::{render_query, render_statement};
use super::tsv::parse_tsv;
use crate::query::{Query, Statement};
use crate::result::{QueryStats, ResultSet};
use crate::store::ColumnarStore;

/// Store backend that renders the IR to ClickHouse SQL.
#[derive(Debug)]
pub struct SqlStore<T> {
    transport: T,
}

impl<T: SqlTransport> SqlStore<T> {
    /// Wrap a transport.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn send(&self, sql: &str, query_id: &str) -> LensResult<(SqlResponse, QueryStats)> {
        log::debug!("[{query_id}]\n{sql}");
        let started = Instant::now();
        let response = self.transport.send(sql, query_id).await?;
        let summary = response.summary.unwrap_or_default();
        let stats = QueryStats {
            elapsed: started.elapsed(),
            rows: summary.result_rows.max(summary.written_rows),
            rows_read: summary.read_rows,
            bytes_read: summary.read_bytes,
            ..QueryStats::new(query_id)
        };
        Ok((response, stats))
    }
}

impl SqlStore<HttpTransport> {
    /// Connect to the ClickHouse HTTP interface described by `config`.
    pub fn connect(config: &StoreConfig) -> LensResult<Self> {
        Ok(Self::new(HttpTransport::new(config)?))
    }
}

#[async_trait]
impl<T: SqlTransport> ColumnarStore for SqlStore<T> {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    async fn query(&self, query: &Query, query_id: &str) -> LensResult<ResultSet> {
        let sql = render_query(query)?;
        let (response, stats) = self.send(&sql, query_id).await?;
        parse_tsv(&response.body, stats)
    }

    async fn execute(&self, statement: &Statement, query_id: &str) -> LensResult<QueryStats> {
        let mut total = QueryStats::new(query_id);
        for sql in render_statement(statement)? {
            let (_, stats) = self.send(&sql, query_id).await?;
            total.absorb(&stats);
        }
        Ok(total)
    }
}
