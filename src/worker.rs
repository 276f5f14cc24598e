//! Background worker context.
//!
//! Spawns the worker thread and holds the host's connection to the worker's
//! root object. The thread cannot be killed; [`Worker::terminate`] closes
//! the host end and the worker exits once its loop sees every port gone.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use ocr_rpc::{MessageChannel, RemoteProxy};
use ocr_worker::{runtime, EngineFactory};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::ClientError;

pub struct Worker {
    name: String,
    root: RemoteProxy,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Start a worker thread serving the worker API.
    pub fn spawn(
        factory: Arc<dyn EngineFactory>,
        config: &ClientConfig,
    ) -> Result<Self, ClientError> {
        let (host, worker) = MessageChannel::new();
        let worker_config = config.worker_config();
        let name = worker_config.thread_name.clone();

        let handle = runtime::spawn(worker, factory, worker_config)
            .map_err(|e| ClientError::WorkerSpawn(e.to_string()))?;
        let root = RemoteProxy::wrap_with(host, ocr_rpc::Codec::shared(), config.request_timeout())?;
        info!(worker = %name, "worker spawned");

        Ok(Self {
            name,
            root,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Proxy for the worker's root object.
    pub fn root(&self) -> &RemoteProxy {
        &self.root
    }

    /// Close the host end of the root port.
    pub fn terminate(&self) {
        debug!(worker = %self.name, "terminating worker");
        self.root.close();
    }

    /// Whether the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }

    /// Wait up to `timeout` for the worker thread to exit.
    pub async fn wait_for_exit(&self, timeout: Duration) -> bool {
        let poll = Duration::from_millis(5);
        let deadline = tokio::time::Instant::now() + timeout;
        while !self.is_finished() {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(poll).await;
        }
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
        true
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocr_worker::MockEngineFactory;

    #[tokio::test]
    async fn test_worker_thread_uses_configured_name() {
        let config = ClientConfig {
            worker_name: "ocr-test-worker".to_string(),
            ..ClientConfig::default()
        };
        let worker = Worker::spawn(Arc::new(MockEngineFactory::new()), &config).unwrap();
        assert_eq!(worker.name(), "ocr-test-worker");
        assert!(!worker.is_finished());

        worker.terminate();
        assert!(worker.wait_for_exit(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_terminated_worker_rejects_requests() {
        let worker =
            Worker::spawn(Arc::new(MockEngineFactory::new()), &ClientConfig::default()).unwrap();
        worker.terminate();
        let err = worker
            .root()
            .call("createOCREngine", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ocr_rpc::RpcError::Transport(_)));
    }
}
