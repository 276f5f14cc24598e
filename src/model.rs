//! Model inputs accepted by the client.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::ClientError;

/// Where a trained model comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
    /// Fetched over HTTP by the client before it is sent to the worker.
    Url(String),
}

impl ModelSource {
    /// Resolve the source to model bytes.
    pub async fn load(
        self,
        http: &reqwest::Client,
        timeout: Duration,
    ) -> Result<Vec<u8>, ClientError> {
        match self {
            ModelSource::Bytes(bytes) => Ok(bytes),
            ModelSource::Path(path) => {
                debug!(path = %path.display(), "reading model file");
                Ok(tokio::fs::read(&path).await?)
            }
            ModelSource::Url(url) => fetch(http, &url, timeout).await,
        }
    }
}

async fn fetch(http: &reqwest::Client, url: &str, timeout: Duration) -> Result<Vec<u8>, ClientError> {
    let fetch_error = |e: reqwest::Error| ClientError::ModelFetch {
        url: url.to_string(),
        message: e.to_string(),
    };

    info!(url, "fetching model");
    let response = http
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(fetch_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::ModelStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let bytes = response.bytes().await.map_err(fetch_error)?;
    debug!(url, len = bytes.len(), "model fetched");
    Ok(bytes.to_vec())
}

impl From<Vec<u8>> for ModelSource {
    fn from(bytes: Vec<u8>) -> Self {
        ModelSource::Bytes(bytes)
    }
}

impl From<&[u8]> for ModelSource {
    fn from(bytes: &[u8]) -> Self {
        ModelSource::Bytes(bytes.to_vec())
    }
}

impl From<PathBuf> for ModelSource {
    fn from(path: PathBuf) -> Self {
        ModelSource::Path(path)
    }
}

impl From<&Path> for ModelSource {
    fn from(path: &Path) -> Self {
        ModelSource::Path(path.to_path_buf())
    }
}

/// Strings are URLs.
impl From<&str> for ModelSource {
    fn from(url: &str) -> Self {
        ModelSource::Url(url.to_string())
    }
}

impl From<String> for ModelSource {
    fn from(url: String) -> Self {
        ModelSource::Url(url)
    }
}
