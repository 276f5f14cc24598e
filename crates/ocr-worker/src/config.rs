//! Worker configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Worker configuration settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Name of the worker thread.
    pub thread_name: String,
    /// Engine binary used when `createOCREngine` is called without one.
    /// `None` lets the engine factory pick its built-in default.
    pub engine_binary_path: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: "ocr-worker".to_string(),
            engine_binary_path: None,
        }
    }
}
