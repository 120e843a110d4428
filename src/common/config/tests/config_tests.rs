//! Unit tests for common-config crate

use common_config::{EngineConfig, LensConfig, StoreBackend, StoreConfig};

#[test]
fn test_lens_config_default() {
    let config = LensConfig::default();

    assert!(config.engine.estimate_row_counts);
    assert_eq!(config.engine.diagnostic_lines, 3);
    assert_eq!(config.engine.default_item_order, "$c DESC, $v DESC");
    assert_eq!(config.engine.default_item_limit, None);

    assert_eq!(config.store.backend, StoreBackend::Memory);
    assert_eq!(config.store.url, "http://localhost:8123");
    assert_eq!(config.store.database, "default");
    assert_eq!(config.store.timeout_secs, 30);
}

#[test]
fn test_store_backend_default() {
    assert_eq!(StoreBackend::default(), StoreBackend::Memory);
    assert_ne!(StoreBackend::Memory, StoreBackend::ClickHouse);
}

#[test]
fn test_config_serialization_roundtrip() {
    let mut config = LensConfig::default();
    config.engine.estimate_row_counts = false;
    config.engine.default_item_limit = Some(25);
    config.store.backend = StoreBackend::ClickHouse;
    config.store.database = "spc".to_string();
    config.store.user = Some("reader".to_string());

    let json = serde_json::to_string(&config).unwrap();
    let deserialized: LensConfig = serde_json::from_str(&json).unwrap();

    assert_eq!(deserialized, config);
}

#[test]
fn test_partial_json_takes_defaults() {
    let config = LensConfig::from_json_str(r#"{"store": {"backend": "ClickHouse", "database": "northwind"}}"#)
        .unwrap();

    assert_eq!(config.store.backend, StoreBackend::ClickHouse);
    assert_eq!(config.store.database, "northwind");
    assert_eq!(config.store.url, StoreConfig::default().url);
    assert_eq!(config.engine, EngineConfig::default());
}

#[test]
fn test_empty_json_is_default() {
    let config = LensConfig::from_json_str("{}").unwrap();
    assert_eq!(config, LensConfig::default());
}

#[test]
fn test_invalid_json_is_error() {
    let result = LensConfig::from_json_str("{\"engine\": ");
    assert!(result.is_err());
}

#[test]
fn test_config_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hyperlens.json");

    let mut config = LensConfig::default();
    config.engine.diagnostic_lines = 5;
    config.store.timeout_secs = 5;
    config.write_json_file(&path).unwrap();

    let loaded = LensConfig::from_json_file(&path).unwrap();
    assert_eq!(loaded.engine.diagnostic_lines, 5);
    assert_eq!(loaded.store.timeout_secs, 5);
}

#[test]
fn test_missing_config_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = LensConfig::from_json_file(dir.path().join("absent.json"));
    assert!(matches!(result, Err(common_error::LensError::Io(_))));
}
