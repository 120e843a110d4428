//! Transport to the ClickHouse HTTP interface.

use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use common_config::StoreConfig;
use common_error::{LensError, LensResult};

/// Response format requested for every query.
pub const RESPONSE_FORMAT: &str = "TabSeparatedWithNamesAndTypes";

const SUMMARY_HEADER: &str = "X-ClickHouse-Summary";

/// Execution counters reported by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub read_rows: u64,
    pub read_bytes: u64,
    pub written_rows: u64,
    pub result_rows: u64,
}

impl Summary {
    /// Parse the summary header. Counters are JSON strings.
    pub fn from_header(text: &str) -> LensResult<Self> {
        let fields: HashMap<String, serde_json::Value> = serde_json::from_str(text)?;
        let counter = |name: &str| -> u64 {
            match fields.get(name) {
                Some(serde_json::Value::String(s)) => s.parse().unwrap_or_default(),
                Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or_default(),
                _ => 0,
            }
        };
        Ok(Self {
            read_rows: counter("read_rows"),
            read_bytes: counter("read_bytes"),
            written_rows: counter("written_rows"),
            result_rows: counter("result_rows"),
        })
    }
}

/// Raw response to one SQL statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlResponse {
    pub body: String,
    pub summary: Option<Summary>,
}

/// Sends SQL text to a ClickHouse server.
#[async_trait]
pub trait SqlTransport: Send + Sync + Debug {
    /// Send one statement. Failures are `Execution` errors labelled `query_id`.
    async fn send(&self, sql: &str, query_id: &str) -> LensResult<SqlResponse>;
}

/// HTTP transport built on `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    database: String,
    user: Option<String>,
    password: Option<String>,
}

impl HttpTransport {
    /// Create a transport from store configuration.
    pub fn new(config: &StoreConfig) -> LensResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(LensError::external)?;
        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    /// Server base URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SqlTransport for HttpTransport {
    async fn send(&self, sql: &str, query_id: &str) -> LensResult<SqlResponse> {
        let mut request = self
            .client
            .post(format!("{}/", self.url))
            .query(&[
                ("database", self.database.as_str()),
                ("default_format", RESPONSE_FORMAT),
            ])
            .body(sql.to_string());
        if let Some(user) = &self.user {
            request = request.header("X-ClickHouse-User", user);
        }
        if let Some(password) = &self.password {
            request = request.header("X-ClickHouse-Key", password);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LensError::execution(query_id, e))?;
        let status = response.status();
        let summary = match response.headers().get(SUMMARY_HEADER) {
            Some(header) => match header.to_str() {
                Ok(text) => Summary::from_header(text).ok(),
                Err(_) => None,
            },
            None => None,
        };
        let body = response
            .text()
            .await
            .map_err(|e| LensError::execution(query_id, e))?;
        if !status.is_success() {
            return Err(LensError::execution(query_id, body.trim()));
        }
        Ok(SqlResponse { body, summary })
    }
}
