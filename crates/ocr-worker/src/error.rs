//! Session errors.
//!
//! Every variant has a stable `name()` that travels across the RPC boundary
//! as the thrown error's name, so the host can rebuild the same variant.

use ocr_rpc::Thrown;

/// Errors raised by an engine session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Text recognition model failed to load")]
    ModelLoad,

    #[error("{0}")]
    ImageLoad(String),

    #[error("No image loaded")]
    NoImageLoaded,

    #[error("No text recognition model loaded")]
    ModelNotLoaded,

    #[error("Invalid text unit: {0}")]
    InvalidTextUnit(String),

    #[error("Unable to get variable {0}")]
    GetVariable(String),

    #[error("Unable to set variable {0}")]
    SetVariable(String),

    #[error("Engine session has been destroyed")]
    Destroyed,

    #[error("{0}")]
    Engine(String),
}

impl SessionError {
    pub fn name(&self) -> &'static str {
        match self {
            SessionError::ModelLoad => "ModelLoadError",
            SessionError::ImageLoad(_) => "ImageLoadError",
            SessionError::NoImageLoaded => "NoImageLoadedError",
            SessionError::ModelNotLoaded => "ModelNotLoadedError",
            SessionError::InvalidTextUnit(_) => "InvalidTextUnitError",
            SessionError::GetVariable(_) => "GetVariableError",
            SessionError::SetVariable(_) => "SetVariableError",
            SessionError::Destroyed => "SessionDestroyedError",
            SessionError::Engine(_) => "EngineError",
        }
    }

    /// Rebuild a session error from a thrown value received over the wire.
    /// Returns `None` for names this type does not produce.
    pub fn from_thrown(thrown: &Thrown) -> Option<Self> {
        let (name, message) = match thrown {
            Thrown::Error(info) => (info.name.as_str(), info.message.as_str()),
            Thrown::Value(_) => return None,
        };
        let suffix = |prefix: &str| message.strip_prefix(prefix).unwrap_or(message).to_string();
        let error = match name {
            "ModelLoadError" => SessionError::ModelLoad,
            "ImageLoadError" => SessionError::ImageLoad(message.to_string()),
            "NoImageLoadedError" => SessionError::NoImageLoaded,
            "ModelNotLoadedError" => SessionError::ModelNotLoaded,
            "InvalidTextUnitError" => SessionError::InvalidTextUnit(suffix("Invalid text unit: ")),
            "GetVariableError" => SessionError::GetVariable(suffix("Unable to get variable ")),
            "SetVariableError" => SessionError::SetVariable(suffix("Unable to set variable ")),
            "SessionDestroyedError" => SessionError::Destroyed,
            "EngineError" => SessionError::Engine(message.to_string()),
            _ => return None,
        };
        Some(error)
    }
}

impl From<SessionError> for Thrown {
    fn from(error: SessionError) -> Self {
        Thrown::error(error.name(), error.to_string())
    }
}
