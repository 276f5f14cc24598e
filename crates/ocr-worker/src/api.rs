//! Worker root object.
//!
//! The object exposed on the worker's main port. Its only job is to create
//! engine sessions and hand them back as proxied objects:
//!
//! - APPLY `createOCREngine(binary | null, progressPort?)`
//! - CONSTRUCT `EngineSession(binary | null, progressPort?)`

use std::sync::Arc;

use ocr_rpc::{Arguments, Proxied, RemoteObject, RpcValue, Thrown};
use tracing::{debug, info};

use crate::config::WorkerConfig;
use crate::engine::EngineFactory;
use crate::error::SessionError;
use crate::session::EngineSession;

pub struct WorkerApi {
    factory: Arc<dyn EngineFactory>,
    config: WorkerConfig,
    sessions_created: usize,
}

impl WorkerApi {
    pub fn new(factory: Arc<dyn EngineFactory>, config: WorkerConfig) -> Self {
        Self {
            factory,
            config,
            sessions_created: 0,
        }
    }

    pub fn sessions_created(&self) -> usize {
        self.sessions_created
    }

    fn create_session(&mut self, mut args: Arguments) -> Result<Proxied, Thrown> {
        let binary = match args.optional_bytes(0, "binary")? {
            Some(binary) => Some(binary),
            None => self.default_binary()?,
        };
        let progress_port = args.optional_port(1, "progressPort")?;

        let engine = self
            .factory
            .create(binary)
            .map_err(|e| SessionError::Engine(e.to_string()))?;
        self.sessions_created += 1;
        info!(
            session = self.sessions_created,
            progress = progress_port.is_some(),
            "engine session created"
        );
        Ok(Proxied::new(EngineSession::new(engine, progress_port)))
    }

    fn default_binary(&self) -> Result<Option<Vec<u8>>, SessionError> {
        let Some(path) = &self.config.engine_binary_path else {
            return Ok(None);
        };
        debug!(path = %path.display(), "reading engine binary");
        std::fs::read(path).map(Some).map_err(|e| {
            SessionError::Engine(format!(
                "failed to read engine binary {}: {}",
                path.display(),
                e
            ))
        })
    }
}

impl RemoteObject for WorkerApi {
    fn apply(&mut self, name: &str, args: Arguments) -> Result<RpcValue, Thrown> {
        match name {
            "createOCREngine" => Ok(RpcValue::Proxied(self.create_session(args)?)),
            _ => Err(Thrown::type_error(format!("{} is not a function", name))),
        }
    }

    fn construct(&mut self, name: &str, args: Arguments) -> Result<Proxied, Thrown> {
        match name {
            "EngineSession" => self.create_session(args),
            _ => Err(Thrown::type_error(format!("{} is not a constructor", name))),
        }
    }
}
