//! Configuration layering tests

mod fixtures;

use std::fs;
use std::time::Duration;

use ocr_lane::config::{ConfigOrigin, LayeredConfig};
use ocr_lane::{ClientConfig, ConfigError, TextUnit};
use serde_json::json;
use tempfile::TempDir;

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("ocr-lane.toml");
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_three_layers_in_precedence_order() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
worker_name = "file-worker"
request_timeout_ms = 30000
model_fetch_timeout_seconds = 120
"#,
    );

    let layered =
        LayeredConfig::build(Some(&path), Some(json!({"request_timeout_ms": 5000}))).unwrap();
    let origins: Vec<_> = layered.sources.iter().map(|s| s.origin.clone()).collect();
    assert_eq!(
        origins,
        vec![ConfigOrigin::Builtin, ConfigOrigin::File, ConfigOrigin::Override]
    );

    let config = layered.client_config().unwrap();
    assert_eq!(config.worker_name, "file-worker");
    assert_eq!(config.request_timeout(), Some(Duration::from_millis(5000)));
    assert_eq!(config.model_fetch_timeout(), Duration::from_secs(120));
    assert_eq!(config.engine_binary_path, None);
}

#[test]
fn test_file_digest_changes_with_contents() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "worker_name = \"a\"\n");
    let first = LayeredConfig::build(Some(&path), None).unwrap();

    fs::write(&path, "worker_name = \"b\"\n").unwrap();
    let second = LayeredConfig::build(Some(&path), None).unwrap();

    assert_ne!(first.sources[1].digest, second.sources[1].digest);
    assert_eq!(second.get("worker_name"), Some(&json!("b")));
}

#[test]
fn test_unknown_keys_are_ignored() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[engine.variables]\nuser_defined_dpi = \"300\"\n");
    let config = ClientConfig::load(Some(&path), None).unwrap();
    assert_eq!(config, ClientConfig::default());
}

#[test]
fn test_wrong_types_fail_to_deserialize() {
    let err = ClientConfig::load(None, Some(json!({"engine_binary_path": 7}))).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
fn test_out_of_range_file_values_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "model_fetch_timeout_seconds = 86400\n");
    let err = ClientConfig::load(Some(&path), None).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));
}

#[tokio::test]
async fn test_client_runs_with_loaded_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "worker_name = \"configured-worker\"\nrequest_timeout_ms = 10000\n",
    );
    let config = ClientConfig::load(Some(&path), None).unwrap();

    let factory = fixtures::scripted_factory();
    let client = fixtures::client_with(&factory, config);
    assert_eq!(client.worker().name(), "configured-worker");

    client.load_image(fixtures::document_page()).await.unwrap();
    let boxes = client.get_bounding_boxes(TextUnit::Word).await.unwrap();
    assert_eq!(boxes.len(), 9);
}
