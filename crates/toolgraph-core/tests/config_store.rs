use std::path::PathBuf;

use tempfile::TempDir;

use toolgraph_core::config::{ConfigStore, LoaderConfig};

#[test]
fn load_missing_returns_defaults() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::from_path(temp.path().join("config.toml"));

    let config = store.load().unwrap();

    assert_eq!(config.request_timeout, LoaderConfig::default().request_timeout);
    assert!(config.resolve_timeout.is_none());
}

#[test]
fn save_then_load_roundtrip() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::from_path(temp.path().join("nested").join("config.toml"));

    let config = LoaderConfig {
        request_timeout: 5,
        resolve_timeout: Some(120),
        working_dir: Some(PathBuf::from("/srv/tools")),
        ..LoaderConfig::default()
    };
    store.save(&config).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded.request_timeout, 5);
    assert_eq!(loaded.resolve_timeout, Some(120));
}

#[test]
fn invalid_file_reports_path() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(&path, "request_timeout = 0\n").unwrap();

    let err = ConfigStore::from_path(path).load().unwrap_err();
    assert!(format!("{:#}", err).contains("config.toml"));
}
