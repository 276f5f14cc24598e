//! Values crossing an execution-context boundary.
//!
//! Plain values are copied as JSON. Buffers and ports are [`Transferable`]
//! and move with the envelope. Objects that should stay where they are and be
//! driven remotely are wrapped in [`Proxied`]; thrown values in [`Thrown`].

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dispatcher::{RemoteObject, SharedObject};
use crate::endpoint::MessagePort;
use crate::error::RpcError;
use crate::proxy::RemoteProxy;

/// Payload whose ownership moves to the receiver.
#[derive(Debug)]
pub enum Transferable {
    Buffer(Vec<u8>),
    Port(MessagePort),
}

impl Transferable {
    fn kind(&self) -> &'static str {
        match self {
            Transferable::Buffer(_) => "buffer",
            Transferable::Port(_) => "port",
        }
    }
}

/// Marker asking the codec to serve an object remotely instead of copying it.
#[derive(Clone)]
pub struct Proxied(pub SharedObject);

impl Proxied {
    /// Wrap an object so it is exposed on a fresh sub-channel when sent.
    pub fn new<T: RemoteObject + 'static>(object: T) -> Self {
        let shared: SharedObject = Arc::new(Mutex::new(object));
        Self(shared)
    }

    /// Wrap an already shared object.
    pub fn from_shared(object: SharedObject) -> Self {
        Self(object)
    }
}

impl fmt::Debug for Proxied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Proxied(..)")
    }
}

/// Details of an error-like thrown value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// A thrown value, either error-like or an arbitrary value.
#[derive(Debug, Clone, PartialEq)]
pub enum Thrown {
    Error(ErrorInfo),
    Value(Value),
}

impl Thrown {
    /// Error-like thrown value without a stack.
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Thrown::Error(ErrorInfo {
            name: name.into(),
            message: message.into(),
            stack: None,
        })
    }

    /// `TypeError` for misuse of an exposed object.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::error("TypeError", message)
    }

    /// Name of an error-like value, `None` for opaque thrown values.
    pub fn name(&self) -> Option<&str> {
        match self {
            Thrown::Error(info) => Some(&info.name),
            Thrown::Value(_) => None,
        }
    }

    /// Message of an error-like value, `None` for opaque thrown values.
    pub fn message(&self) -> Option<&str> {
        match self {
            Thrown::Error(info) => Some(&info.message),
            Thrown::Value(_) => None,
        }
    }
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Thrown::Error(info) => write!(f, "{}: {}", info.name, info.message),
            Thrown::Value(value) => write!(f, "thrown value: {}", value),
        }
    }
}

/// Any value that can be sent to, or received from, a remote context.
#[derive(Debug)]
pub enum RpcValue {
    Plain(Value),
    Transfer(Transferable),
    Proxied(Proxied),
    Remote(RemoteProxy),
    Thrown(Thrown),
}

impl RpcValue {
    /// JSON null.
    pub fn null() -> Self {
        RpcValue::Plain(Value::Null)
    }

    /// Serialize a plain value.
    pub fn plain<T: Serialize>(value: &T) -> Result<Self, RpcError> {
        Ok(RpcValue::Plain(serde_json::to_value(value)?))
    }

    /// A buffer that will be moved, not copied.
    pub fn bytes(bytes: Vec<u8>) -> Self {
        RpcValue::Transfer(Transferable::Buffer(bytes))
    }

    /// A port that will be moved to the receiver.
    pub fn port(port: MessagePort) -> Self {
        RpcValue::Transfer(Transferable::Port(port))
    }

    /// Mark an object to be served remotely.
    pub fn proxied<T: RemoteObject + 'static>(object: T) -> Self {
        RpcValue::Proxied(Proxied::new(object))
    }

    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcValue::Plain(_) => "plain value",
            RpcValue::Transfer(t) => t.kind(),
            RpcValue::Proxied(_) => "proxied object",
            RpcValue::Remote(_) => "remote proxy",
            RpcValue::Thrown(_) => "thrown value",
        }
    }

    /// Re-raise a thrown value as an error; pass anything else through.
    pub fn into_result(self) -> Result<RpcValue, RpcError> {
        match self {
            RpcValue::Thrown(thrown) => Err(RpcError::Thrown(thrown)),
            other => Ok(other),
        }
    }

    /// Deserialize a plain value.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, RpcError> {
        match self.into_result()? {
            RpcValue::Plain(value) => Ok(serde_json::from_value(value)?),
            other => Err(RpcError::UnexpectedValue {
                expected: "plain value",
                actual: other.kind(),
            }),
        }
    }

    /// Take a transferred buffer.
    pub fn into_bytes(self) -> Result<Vec<u8>, RpcError> {
        match self.into_result()? {
            RpcValue::Transfer(Transferable::Buffer(bytes)) => Ok(bytes),
            other => Err(RpcError::UnexpectedValue {
                expected: "buffer",
                actual: other.kind(),
            }),
        }
    }

    /// Take a transferred port.
    pub fn into_port(self) -> Result<MessagePort, RpcError> {
        match self.into_result()? {
            RpcValue::Transfer(Transferable::Port(port)) => Ok(port),
            other => Err(RpcError::UnexpectedValue {
                expected: "port",
                actual: other.kind(),
            }),
        }
    }

    /// Take a decoded remote proxy.
    pub fn into_remote(self) -> Result<RemoteProxy, RpcError> {
        match self.into_result()? {
            RpcValue::Remote(proxy) => Ok(proxy),
            other => Err(RpcError::UnexpectedValue {
                expected: "remote proxy",
                actual: other.kind(),
            }),
        }
    }

    /// `true` for JSON null.
    pub fn is_null(&self) -> bool {
        matches!(self, RpcValue::Plain(Value::Null))
    }
}

impl From<Value> for RpcValue {
    fn from(value: Value) -> Self {
        RpcValue::Plain(value)
    }
}

impl From<Thrown> for RpcValue {
    fn from(thrown: Thrown) -> Self {
        RpcValue::Thrown(thrown)
    }
}
