//! Tests for TOML config loading, creation, and path resolution.

use super::*;
use classroom_common::ConfigError;
use std::path::{Path, PathBuf};

#[test]
fn load_from_nonexistent_returns_file_not_found() {
    let result = load_from_path(Path::new("/tmp/nonexistent_classroom_config.toml"));
    assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
}

#[test]
fn load_valid_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[relay]
port = 9001

[client]
url = "wss://relay.example.com/ws"
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.relay.port, 9001);
    assert_eq!(config.client.url, "wss://relay.example.com/ws");
    // Defaults preserved
    assert_eq!(config.relay.bind, "0.0.0.0");
    assert_eq!(config.client.max_reconnect_delay_secs, 30);
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "this is not valid toml {{{").unwrap();

    let result = load_from_path(&path);
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn invalid_values_are_returned_as_parsed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[relay]\nchannel_capacity = 0\n").unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.relay.channel_capacity, 0);
}

#[test]
fn create_and_load_default_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("classroom").join("config.toml");

    create_default_config(&path).unwrap();
    assert!(path.exists());

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.relay.port, 8080);
    assert_eq!(config.client.url, "ws://127.0.0.1:8080");
}

#[test]
fn create_keeps_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[relay]\nport = 9100\n").unwrap();

    create_default_config(&path).unwrap();
    assert_eq!(load_from_path(&path).unwrap().relay.port, 9100);
}

#[test]
fn parse_rejects_wrong_types() {
    let result = parse("[relay]\nport = \"eighty\"\n");
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn config_path_prefers_env_override() {
    let path = paths::resolve_config_path(
        Some("/srv/classroom/relay.toml".into()),
        Some(PathBuf::from("/home/ada/.config")),
    )
    .unwrap();
    assert_eq!(path, PathBuf::from("/srv/classroom/relay.toml"));
}

#[test]
fn config_path_falls_back_to_platform_dir() {
    let path = paths::resolve_config_path(Some("".into()), Some(PathBuf::from("/home/ada/.config")))
        .unwrap();
    assert_eq!(path, PathBuf::from("/home/ada/.config/classroom/config.toml"));

    let missing = paths::resolve_config_path(None, None);
    assert!(matches!(missing, Err(ConfigError::ParseError(_))));
}
