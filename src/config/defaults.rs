//! Built-in client defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Worker thread name (default: "ocr-worker")
    pub worker_name: String,

    /// Request timeout in milliseconds (default: none)
    pub request_timeout_ms: Option<u64>,

    /// Model download timeout in seconds (default: 60)
    pub model_fetch_timeout_seconds: u64,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            worker_name: "ocr-worker".to_string(),
            request_timeout_ms: None,
            model_fetch_timeout_seconds: 60,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "worker_name": self.worker_name,
            "engine_binary_path": null,
            "request_timeout_ms": self.request_timeout_ms,
            "model_fetch_timeout_seconds": self.model_fetch_timeout_seconds,
        })
    }
}
