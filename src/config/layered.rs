//! Merged configuration with provenance
//!
//! Records which sources contributed to the merged value, including a
//! SHA-256 digest of each file's raw bytes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;
use super::ClientConfig;

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Override,
}

/// A contributing config source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/override)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/override)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// The merged configuration object and the sources behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayeredConfig {
    pub config: Value,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

impl LayeredConfig {
    /// Merge defaults, the file at `path` if it exists, and `overrides`.
    pub fn build(path: Option<&Path>, overrides: Option<Value>) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = path.filter(|p| p.exists()) {
            let (value, digest) = load_toml_file(path)?;
            debug!(path = %path.display(), %digest, "loaded config file");
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(overrides) = overrides {
            if !overrides.is_object() {
                return Err(ConfigError::ValidationError(
                    "overrides must be a table".to_string(),
                ));
            }
            layers.push(overrides);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Override,
                path: None,
                digest: None,
            });
        }

        let config = merge_layers(layers);
        validate_config(&config)?;
        Ok(Self { config, sources })
    }

    /// Deserialize the merged value.
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        serde_json::from_value(self.config.clone())
            .map_err(|e| ConfigError::ParseError(format!("invalid configuration: {}", e)))
    }

    /// Get a value by dotted key path.
    pub fn get(&self, key: &str) -> Option<&Value> {
        key.split('.')
            .try_fold(&self.config, |value, part| value.get(part))
    }
}

fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
    let digest = hex::encode(Sha256::digest(&bytes));

    let contents = String::from_utf8(bytes)
        .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;
    let table: toml::Value = toml::from_str(&contents)
        .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

    Ok((toml_to_json(table), digest))
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

fn validate_config(config: &Value) -> Result<(), ConfigError> {
    match config.get("worker_name") {
        Some(Value::String(name)) if !name.trim().is_empty() => {}
        _ => {
            return Err(ConfigError::ValidationError(
                "worker_name must be a non-empty string".to_string(),
            ))
        }
    }

    // request_timeout_ms must be absent or in (0, 3600000]
    if let Some(timeout) = config.get("request_timeout_ms").filter(|v| !v.is_null()) {
        match timeout.as_u64() {
            Some(ms) if ms > 0 && ms <= 3_600_000 => {}
            _ => {
                return Err(ConfigError::ValidationError(
                    "request_timeout_ms must be in (0, 3600000]".to_string(),
                ))
            }
        }
    }

    // model_fetch_timeout_seconds must be in (0, 3600]
    match config.get("model_fetch_timeout_seconds").and_then(Value::as_u64) {
        Some(seconds) if seconds > 0 && seconds <= 3600 => Ok(()),
        _ => Err(ConfigError::ValidationError(
            "model_fetch_timeout_seconds must be in (0, 3600]".to_string(),
        )),
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
