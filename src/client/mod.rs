//! Session client.
//!
//! [`OcrClient`] owns one worker for its whole life. Construction spawns the
//! worker, opens the progress channel, and posts `createOCREngine` without
//! waiting for it; the first operation awaits the reply and every later one
//! reuses the session proxy.

pub mod progress;
pub mod remote_session;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ocr_rpc::{MessageChannel, PendingReply, RpcError, RpcValue};
use ocr_worker::{BoxItem, EngineFactory, Orientation, TextItem, TextUnit};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::image::ImageSource;
use crate::model::ModelSource;
use crate::worker::Worker;

pub use progress::{ListenerGuard, ProgressCallback, ProgressChannel, ProgressListeners};
pub use remote_session::SessionProxy;

/// Asynchronous OCR client backed by a worker thread.
pub struct OcrClient {
    config: ClientConfig,
    worker: Worker,
    progress: ProgressChannel,
    creation: Mutex<Option<PendingReply>>,
    session: OnceCell<SessionProxy>,
    http: reqwest::Client,
    destroyed: AtomicBool,
}

impl OcrClient {
    /// Spawn a worker whose sessions use engines from `factory`.
    pub fn new(config: ClientConfig, factory: Arc<dyn EngineFactory>) -> Result<Self, ClientError> {
        Self::with_engine_binary(config, factory, None)
    }

    /// Like [`OcrClient::new`], handing `binary` to the engine factory.
    ///
    /// The buffer is transferred to the worker. Without one the worker falls
    /// back to `engine_binary_path`, then to the factory's own default.
    pub fn with_engine_binary(
        config: ClientConfig,
        factory: Arc<dyn EngineFactory>,
        binary: Option<Vec<u8>>,
    ) -> Result<Self, ClientError> {
        let worker = Worker::spawn(factory, &config)?;
        let (progress_host, progress_worker) = MessageChannel::new();
        let progress = ProgressChannel::open(progress_host)?;

        let binary = binary.map_or_else(RpcValue::null, RpcValue::bytes);
        let creation = worker
            .root()
            .member("createOCREngine")
            .send_apply(vec![binary, RpcValue::port(progress_worker)])?;
        debug!(id = creation.id(), "engine session requested");

        Ok(Self {
            config,
            worker,
            progress,
            creation: Mutex::new(Some(creation)),
            session: OnceCell::new(),
            http: reqwest::Client::new(),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// The remote session, once the worker has created it.
    ///
    /// With a request timeout configured, a slow creation fails this call
    /// with [`RpcError::Timeout`] and the next call keeps waiting on the
    /// same request.
    pub async fn session(&self) -> Result<&SessionProxy, ClientError> {
        if self.is_destroyed() {
            return Err(ClientError::Destroyed);
        }
        self.session
            .get_or_try_init(|| async {
                let mut creation = self.creation.lock().await;
                let reply = creation.as_mut().ok_or_else(|| {
                    ClientError::SessionUnavailable("engine creation failed earlier".to_string())
                })?;
                let settled = match reply.wait_for(self.config.request_timeout()).await {
                    Ok(None) => {
                        warn!(id = reply.id(), "engine session not ready yet");
                        return Err(RpcError::Timeout(reply.id().to_string()).into());
                    }
                    Ok(Some(value)) => value.into_remote(),
                    Err(e) => Err(e),
                };
                *creation = None;
                let remote = settled?;
                info!(worker = %self.worker.name(), "engine session ready");
                Ok(SessionProxy::new(remote))
            })
            .await
    }

    /// Load a trained model. URLs are fetched here, not in the worker.
    pub async fn load_model(&self, model: impl Into<ModelSource>) -> Result<(), ClientError> {
        let session = self.session().await?;
        let bytes = model
            .into()
            .load(&self.http, self.config.model_fetch_timeout())
            .await?;
        session.load_model(bytes).await
    }

    /// Load an image. Bitmaps are converted to RGBA pixels first.
    pub async fn load_image(&self, image: impl Into<ImageSource>) -> Result<(), ClientError> {
        let session = self.session().await?;
        let pixels = image.into().into_image_data()?;
        session.load_image(pixels).await
    }

    pub async fn clear_image(&self) -> Result<(), ClientError> {
        self.session().await?.clear_image().await
    }

    /// Layout analysis only. Needs an image but no model.
    pub async fn get_bounding_boxes(&self, unit: TextUnit) -> Result<Vec<BoxItem>, ClientError> {
        self.session().await?.bounding_boxes(unit).await
    }

    pub async fn get_text_boxes(
        &self,
        unit: TextUnit,
        on_progress: Option<ProgressCallback>,
    ) -> Result<Vec<TextItem>, ClientError> {
        let session = self.session().await?;
        self.with_progress(on_progress, session.text_boxes(unit)).await
    }

    pub async fn get_text(
        &self,
        on_progress: Option<ProgressCallback>,
    ) -> Result<String, ClientError> {
        let session = self.session().await?;
        self.with_progress(on_progress, session.text()).await
    }

    pub async fn get_hocr(
        &self,
        on_progress: Option<ProgressCallback>,
    ) -> Result<String, ClientError> {
        let session = self.session().await?;
        self.with_progress(on_progress, session.hocr()).await
    }

    pub async fn get_orientation(&self) -> Result<Orientation, ClientError> {
        self.session().await?.orientation().await
    }

    pub async fn get_variable(&self, name: &str) -> Result<String, ClientError> {
        self.session().await?.variable(name).await
    }

    pub async fn set_variable(&self, name: &str, value: &str) -> Result<(), ClientError> {
        self.session().await?.set_variable(name, value).await
    }

    /// Destroy the engine session and shut the worker down.
    ///
    /// Later calls fail with [`ClientError::Destroyed`].
    pub async fn destroy(&self) -> Result<(), ClientError> {
        let session = self.session().await;
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Err(ClientError::Destroyed);
        }

        let outcome = match session {
            Ok(session) => match session.destroy().await {
                Ok(()) => session.release().await,
                Err(e) => {
                    let _ = session.release().await;
                    Err(e)
                }
            },
            Err(e) => {
                warn!(error = %e, "destroying client without an engine session");
                Ok(())
            }
        };

        self.progress.close();
        self.worker.terminate();
        info!(worker = %self.worker.name(), "client destroyed");
        outcome
    }

    /// Wait up to `timeout` for the worker thread to exit.
    pub async fn wait_for_worker_exit(&self, timeout: Duration) -> bool {
        self.worker.wait_for_exit(timeout).await
    }

    async fn with_progress<T>(
        &self,
        on_progress: Option<ProgressCallback>,
        call: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        let guard = on_progress.map(|callback| self.progress.listeners().register(callback));
        let result = call.await;
        // Events of this call must not reach listeners of the next one.
        self.progress.flush();
        drop(guard);
        result
    }
}

impl Drop for OcrClient {
    fn drop(&mut self) {
        self.progress.close();
        self.worker.terminate();
    }
}
