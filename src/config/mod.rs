//! Client configuration
//!
//! Configuration is assembled from three layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. A TOML file (optional)
//! 3. Explicit overrides passed by the embedding application
//!
//! The layers are deep-merged as JSON values and the result is deserialized
//! into a [`ClientConfig`].

mod defaults;
mod layered;
mod merge;

pub use defaults::BuiltinDefaults;
pub use layered::{ConfigError, ConfigOrigin, ConfigSource, LayeredConfig};
pub use merge::{deep_merge, merge_layers};

use std::path::{Path, PathBuf};
use std::time::Duration;

use ocr_worker::WorkerConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Settings for one [`OcrClient`](crate::OcrClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Name of the worker thread.
    pub worker_name: String,

    /// Engine binary handed to the worker when a session is created.
    #[serde(default)]
    pub engine_binary_path: Option<PathBuf>,

    /// Per-request timeout. `None` waits for the worker indefinitely.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,

    /// Timeout for fetching a model from a URL.
    pub model_fetch_timeout_seconds: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let defaults = BuiltinDefaults::default();
        Self {
            worker_name: defaults.worker_name,
            engine_binary_path: None,
            request_timeout_ms: defaults.request_timeout_ms,
            model_fetch_timeout_seconds: defaults.model_fetch_timeout_seconds,
        }
    }
}

impl ClientConfig {
    /// Build the configuration from defaults, an optional TOML file, and
    /// optional overrides.
    pub fn load(path: Option<&Path>, overrides: Option<Value>) -> Result<Self, ConfigError> {
        LayeredConfig::build(path, overrides)?.client_config()
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn model_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.model_fetch_timeout_seconds)
    }

    /// The part of this configuration the worker thread needs.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            thread_name: self.worker_name.clone(),
            engine_binary_path: self.engine_binary_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_default_matches_builtin_layer() {
        let loaded = ClientConfig::load(None, None).unwrap();
        assert_eq!(loaded, ClientConfig::default());
        assert_eq!(loaded.worker_name, "ocr-worker");
        assert_eq!(loaded.request_timeout(), None);
        assert_eq!(loaded.model_fetch_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_overrides_beat_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "worker_name = \"from-file\"").unwrap();
        writeln!(file, "request_timeout_ms = 2500").unwrap();

        let config = ClientConfig::load(
            Some(file.path()),
            Some(json!({"worker_name": "from-override"})),
        )
        .unwrap();
        assert_eq!(config.worker_name, "from-override");
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_worker_config_carries_binary_path() {
        let config = ClientConfig {
            engine_binary_path: Some(PathBuf::from("/opt/ocr/engine.wasm")),
            ..ClientConfig::default()
        };
        let worker = config.worker_config();
        assert_eq!(worker.thread_name, "ocr-worker");
        assert_eq!(
            worker.engine_binary_path.as_deref(),
            Some(Path::new("/opt/ocr/engine.wasm"))
        );
    }
}
