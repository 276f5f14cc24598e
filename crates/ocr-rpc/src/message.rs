//! Wire types.
//!
//! Everything sent over an [`Endpoint`](crate::endpoint::Endpoint) is an
//! [`Envelope`]: a serializable [`Message`] plus the transferables whose
//! ownership moves with it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value::Transferable;

/// Operation requested of a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Get,
    Set,
    Apply,
    Construct,
    Endpoint,
    Release,
    /// Any type this side does not understand. Dispatchers drop these.
    #[serde(other)]
    Unknown,
}

impl MessageType {
    /// Wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Set => "SET",
            Self::Apply => "APPLY",
            Self::Construct => "CONSTRUCT",
            Self::Endpoint => "ENDPOINT",
            Self::Release => "RELEASE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialized form of a value crossing a port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireValue {
    /// Passed through as-is. `transfer` points into the envelope's
    /// transfer list when the value is a moved buffer or port.
    #[serde(rename = "RAW")]
    Raw {
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transfer: Option<usize>,
    },
    /// Serialized by the named transfer handler.
    #[serde(rename = "HANDLER")]
    Handler { name: String, value: Value },
}

impl WireValue {
    /// A raw plain value with no transferable attached.
    pub fn raw(value: Value) -> Self {
        Self::Raw {
            value,
            transfer: None,
        }
    }
}

/// Operation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation token echoed by the matching response.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Property chain from the exposed root, applied left to right.
    #[serde(default)]
    pub path: Vec<String>,
    /// Arguments for APPLY and CONSTRUCT.
    #[serde(
        rename = "argumentList",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub argument_list: Option<Vec<WireValue>>,
    /// New value for SET.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<WireValue>,
}

impl Request {
    /// Create a request with no arguments or value.
    pub fn new(id: impl Into<String>, kind: MessageType, path: Vec<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            path,
            argument_list: None,
            value: None,
        }
    }

    /// Attach an argument list.
    pub fn with_arguments(mut self, arguments: Vec<WireValue>) -> Self {
        self.argument_list = Some(arguments);
        self
    }

    /// Attach a value (SET).
    pub fn with_value(mut self, value: WireValue) -> Self {
        self.value = Some(value);
        self
    }
}

/// Reply to exactly one [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub value: WireValue,
}

/// Progress notification streamed on a progress channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Percentage in [0, 100].
    pub progress: u8,
}

/// Anything that can travel on a port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Message {
    Request(Request),
    Response(Response),
    Progress(ProgressEvent),
}

/// A message together with the transferables it carries.
#[derive(Debug)]
pub struct Envelope {
    pub message: Message,
    pub transfer: Vec<Transferable>,
}

impl Envelope {
    /// Envelope with nothing to transfer.
    pub fn new(message: Message) -> Self {
        Self {
            message,
            transfer: Vec::new(),
        }
    }

    /// Envelope carrying transferables.
    pub fn with_transfer(message: Message, transfer: Vec<Transferable>) -> Self {
        Self { message, transfer }
    }
}

impl From<Message> for Envelope {
    fn from(message: Message) -> Self {
        Self::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let request = Request::new("req-1", MessageType::Apply, vec!["getText".into()])
            .with_arguments(vec![WireValue::raw(json!("word"))]);

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "APPLY");
        assert_eq!(value["path"], json!(["getText"]));
        assert_eq!(value["argumentList"][0]["type"], "RAW");
        assert_eq!(value["argumentList"][0]["value"], "word");
        assert!(value.get("value").is_none());
    }

    #[test]
    fn test_unrecognized_type_deserializes_as_unknown() {
        let request: Request =
            serde_json::from_value(json!({"id": "x", "type": "TELEPORT", "path": []})).unwrap();
        assert_eq!(request.kind, MessageType::Unknown);
    }

    #[test]
    fn test_handler_wire_value_shape() {
        let wire = WireValue::Handler {
            name: "throw".into(),
            value: json!({"isError": false, "value": 3}),
        };
        let value = serde_json::to_value(&wire).unwrap();
        assert_eq!(value["type"], "HANDLER");
        assert_eq!(value["name"], "throw");
        let back: WireValue = serde_json::from_value(value).unwrap();
        assert_eq!(back, wire);
    }

    #[test]
    fn test_raw_transfer_index_is_optional() {
        let wire: WireValue = serde_json::from_value(json!({"type": "RAW", "value": 1})).unwrap();
        assert_eq!(wire, WireValue::raw(json!(1)));
    }
}
