//! Client error type.
//!
//! Session errors thrown by the worker are reconstructed into
//! [`SessionError`] so callers can match on them; everything else the RPC
//! layer reports stays an [`RpcError`].

use ocr_rpc::{RpcError, Thrown};
use ocr_worker::SessionError;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A named error raised by the engine session.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A value thrown by the worker that is not a session error.
    #[error("Remote error: {0}")]
    Remote(Thrown),

    #[error(transparent)]
    Rpc(RpcError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to start worker: {0}")]
    WorkerSpawn(String),

    #[error("Failed to fetch model from {url}: {message}")]
    ModelFetch { url: String, message: String },

    #[error("Model fetch from {url} returned HTTP {status}")]
    ModelStatus { url: String, status: u16 },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// The worker could not create an engine session.
    #[error("Engine session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Client has been destroyed")]
    Destroyed,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// The session error behind this failure, if there is one.
    pub fn session_error(&self) -> Option<&SessionError> {
        match self {
            ClientError::Session(error) => Some(error),
            _ => None,
        }
    }
}

impl From<RpcError> for ClientError {
    fn from(error: RpcError) -> Self {
        match error {
            RpcError::Thrown(thrown) => match SessionError::from_thrown(&thrown) {
                Some(session) => ClientError::Session(session),
                None => ClientError::Remote(thrown),
            },
            other => ClientError::Rpc(other),
        }
    }
}
