//! Configuration management for hyperlens.
//!
//! Provides runtime configuration for the filter engine and for the clients
//! of the external columnar store.

use std::path::Path;

use serde::{Deserialize, Serialize};

use common_error::LensResult;

/// Global hyperlens configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LensConfig {
    /// Filter engine configuration.
    pub engine: EngineConfig,
    /// Columnar store configuration.
    pub store: StoreConfig,
}

impl LensConfig {
    /// Parse a configuration from JSON text. Missing sections take their defaults.
    pub fn from_json_str(json: &str) -> LensResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> LensResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Write the configuration to a JSON file.
    pub fn write_json_file(&self, path: impl AsRef<Path>) -> LensResult<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

/// Filter engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Use the store's approximate distinct count for unfiltered row counts.
    pub estimate_row_counts: bool,
    /// Lines of an upstream error message kept in execution diagnostics.
    pub diagnostic_lines: usize,
    /// Order expression applied when listing items without an explicit order.
    pub default_item_order: String,
    /// Row limit applied when listing items without an explicit limit.
    pub default_item_limit: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            estimate_row_counts: true,
            diagnostic_lines: 3,
            default_item_order: "$c DESC, $v DESC".to_string(),
            default_item_limit: None,
        }
    }
}

/// Store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StoreBackend {
    /// In-process reference store.
    #[default]
    Memory,
    /// ClickHouse reached over its HTTP interface.
    ClickHouse,
}

/// Columnar store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend type.
    pub backend: StoreBackend,
    /// Base URL of the HTTP interface.
    pub url: String,
    /// Database holding the hypergraph tables.
    pub database: String,
    /// User name.
    pub user: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: "http://localhost:8123".to_string(),
            database: "default".to_string(),
            user: None,
            password: None,
            timeout_secs: 30,
        }
    }
}
