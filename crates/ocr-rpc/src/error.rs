//! Error types for the RPC substrate.
//!
//! `TransportError` covers the port itself; `RpcError` covers everything a
//! caller of a remote proxy can observe, including values thrown remotely.

use crate::value::Thrown;

/// Port-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("port is closed")]
    Closed,

    #[error("peer end of the port has gone away")]
    Disconnected,

    #[error("failed to start listener thread: {0}")]
    Spawn(String),
}

/// Errors surfaced by codec, dispatcher and proxy operations.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The proxy (or its connection) was released; nothing was sent.
    #[error("Proxy has been released and is not useable")]
    Released,

    /// A wire value named a handler this codec does not know.
    #[error("Unknown wire handler: {0}")]
    UnknownHandler(String),

    /// A wire value referenced a transfer slot that is absent or already taken.
    #[error("Missing transferable at index {0}")]
    MissingTransfer(usize),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The peer dropped its end before replying.
    #[error("Remote endpoint disconnected before replying")]
    Disconnected,

    #[error("Request {0} timed out")]
    Timeout(String),

    /// A value thrown on the remote side, re-raised locally.
    #[error("{0}")]
    Thrown(Thrown),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A value of one kind was used where another was expected.
    #[error("Expected {expected}, got {actual}")]
    UnexpectedValue {
        expected: &'static str,
        actual: &'static str,
    },
}

impl RpcError {
    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Name used when this error has to be relayed as a thrown value.
    pub fn name(&self) -> &'static str {
        match self {
            RpcError::Released => "ReleasedError",
            RpcError::UnknownHandler(_)
            | RpcError::MissingTransfer(_)
            | RpcError::Protocol(_)
            | RpcError::Serialization(_) => "ProtocolError",
            RpcError::Transport(_) | RpcError::Disconnected => "TransportError",
            RpcError::Timeout(_) => "TimeoutError",
            RpcError::Thrown(_) => "Error",
            RpcError::UnexpectedValue { .. } => "TypeError",
        }
    }
}

impl From<RpcError> for Thrown {
    fn from(error: RpcError) -> Self {
        match error {
            RpcError::Thrown(thrown) => thrown,
            other => Thrown::error(other.name(), other.to_string()),
        }
    }
}
