//! Tests for config loading

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use rotor::config::Config;

#[test]
fn test_config_file_exists() {
    let config_path = Path::new("config.toml");
    assert!(
        config_path.exists(),
        "config.toml should exist in project root"
    );
}

#[test]
fn test_shipped_config_is_valid() {
    let config = Config::from_file(Path::new("config.toml")).unwrap();
    config.validate().unwrap();

    let engine = config.engine_config().unwrap();
    assert_eq!(engine.watcher_period(), Duration::from_secs(60));
    assert!(config.geo.ip_db.is_none());
}

#[test]
fn test_config_from_temp_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[engine]
tick_interval_ms = 100
wheel_buckets = 10

[probe]
endpoints = ["probe.local:8080"]

[object_store]
bucket = "bundles"
public_url = "https://static.example/"
"#
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.engine_config().unwrap().watcher_period(), Duration::from_secs(1));
    assert_eq!(config.probe.endpoints, vec!["probe.local:8080".to_string()]);

    let store = config.object_store_config();
    assert_eq!(store.bucket, "bundles");
    assert_eq!(store.public_url, "https://static.example/");
    assert_eq!(store.endpoint, "http://localhost:9000");
}

#[test]
fn test_malformed_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[engine\ntick_interval_ms = ").unwrap();

    let err = Config::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse TOML"));
}

#[test]
fn test_missing_file_is_rejected() {
    let err = Config::from_file(Path::new("/nonexistent/rotor.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
