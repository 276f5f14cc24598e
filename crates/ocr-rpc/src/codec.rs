//! Wire Protocol Codec
//!
//! Converts [`RpcValue`]s to [`WireValue`]s and back. A registry of named
//! transfer handlers is consulted in registration order; the first handler
//! that accepts a value serializes it. Values no handler accepts go out RAW.
//!
//! Two handlers are always registered:
//! - `proxy`: serves a [`Proxied`](crate::value::Proxied) object on a fresh
//!   sub-channel and sends the other end; decodes into a [`RemoteProxy`]
//! - `throw`: carries thrown values so the receiver re-raises them

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::dispatcher::SharedObject;
use crate::endpoint::{MessageChannel, MessagePort};
use crate::error::RpcError;
use crate::message::WireValue;
use crate::proxy::{Connection, RemoteProxy};
use crate::value::{ErrorInfo, RpcValue, Thrown, Transferable};
use crate::{PROXY_HANDLER, THROW_HANDLER};

/// An object that must be served on `port` once the encoded message is sent.
pub struct Exposure {
    pub object: SharedObject,
    pub port: MessagePort,
}

/// State accumulated while encoding one message.
#[derive(Default)]
pub struct EncodeContext {
    transfer: Vec<Transferable>,
    exposures: Vec<Exposure>,
}

impl EncodeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transferable and return its slot index.
    pub fn push_transfer(&mut self, transferable: Transferable) -> usize {
        self.transfer.push(transferable);
        self.transfer.len() - 1
    }

    /// Schedule `object` to be served on `port`.
    pub fn expose(&mut self, object: SharedObject, port: MessagePort) {
        self.exposures.push(Exposure { object, port });
    }

    /// Split into the transfer list and the pending exposures.
    pub fn into_parts(self) -> (Vec<Transferable>, Vec<Exposure>) {
        (self.transfer, self.exposures)
    }
}

/// Transfer slots of a received envelope plus what is needed to wrap ports.
pub struct DecodeContext {
    slots: Vec<Option<Transferable>>,
    codec: Arc<Codec>,
    timeout: Option<Duration>,
}

impl DecodeContext {
    pub fn new(transfer: Vec<Transferable>, codec: Arc<Codec>, timeout: Option<Duration>) -> Self {
        Self {
            slots: transfer.into_iter().map(Some).collect(),
            codec,
            timeout,
        }
    }

    /// Take a slot. Each slot can be taken once.
    pub fn take(&mut self, index: usize) -> Result<Transferable, RpcError> {
        self.slots
            .get_mut(index)
            .and_then(Option::take)
            .ok_or(RpcError::MissingTransfer(index))
    }

    /// Wrap a received port in a proxy sharing this context's codec.
    pub fn wrap(&self, port: MessagePort) -> Result<RemoteProxy, RpcError> {
        let connection = Connection::open(port, Arc::clone(&self.codec), self.timeout)?;
        Ok(RemoteProxy::new(connection))
    }
}

/// Named serializer for values that need special treatment.
pub trait TransferHandler: Send + Sync {
    /// Name written into HANDLER wire values.
    fn name(&self) -> &'static str;

    /// Whether this handler serializes `value`.
    fn can_handle(&self, value: &RpcValue) -> bool;

    fn serialize(&self, value: RpcValue, ctx: &mut EncodeContext) -> Result<Value, RpcError>;

    fn deserialize(&self, value: Value, ctx: &mut DecodeContext) -> Result<RpcValue, RpcError>;
}

/// Serves proxied objects on a new sub-channel.
pub struct ProxyHandler;

impl TransferHandler for ProxyHandler {
    fn name(&self) -> &'static str {
        PROXY_HANDLER
    }

    fn can_handle(&self, value: &RpcValue) -> bool {
        matches!(value, RpcValue::Proxied(_))
    }

    fn serialize(&self, value: RpcValue, ctx: &mut EncodeContext) -> Result<Value, RpcError> {
        let RpcValue::Proxied(proxied) = value else {
            return Err(RpcError::UnexpectedValue {
                expected: "proxied object",
                actual: value.kind(),
            });
        };
        let (local, remote) = MessageChannel::new();
        ctx.expose(proxied.0, local);
        let index = ctx.push_transfer(Transferable::Port(remote));
        Ok(json!({ "port": index }))
    }

    fn deserialize(&self, value: Value, ctx: &mut DecodeContext) -> Result<RpcValue, RpcError> {
        let index = value
            .get("port")
            .and_then(Value::as_u64)
            .ok_or_else(|| RpcError::protocol("proxy handler payload has no port index"))?;
        match ctx.take(index as usize)? {
            Transferable::Port(port) => Ok(RpcValue::Remote(ctx.wrap(port)?)),
            Transferable::Buffer(_) => Err(RpcError::protocol(
                "proxy handler payload points at a buffer, not a port",
            )),
        }
    }
}

/// Carries thrown values.
///
/// Error-like values travel as `{isError: true, value: {name, message, stack}}`,
/// anything else as `{isError: false, value}`.
pub struct ThrowHandler;

impl TransferHandler for ThrowHandler {
    fn name(&self) -> &'static str {
        THROW_HANDLER
    }

    fn can_handle(&self, value: &RpcValue) -> bool {
        matches!(value, RpcValue::Thrown(_))
    }

    fn serialize(&self, value: RpcValue, _ctx: &mut EncodeContext) -> Result<Value, RpcError> {
        match value {
            RpcValue::Thrown(Thrown::Error(info)) => Ok(json!({
                "isError": true,
                "value": serde_json::to_value(info)?,
            })),
            RpcValue::Thrown(Thrown::Value(value)) => Ok(json!({
                "isError": false,
                "value": value,
            })),
            other => Err(RpcError::UnexpectedValue {
                expected: "thrown value",
                actual: other.kind(),
            }),
        }
    }

    fn deserialize(&self, value: Value, _ctx: &mut DecodeContext) -> Result<RpcValue, RpcError> {
        let is_error = value
            .get("isError")
            .and_then(Value::as_bool)
            .ok_or_else(|| RpcError::protocol("throw handler payload has no isError flag"))?;
        let inner = value.get("value").cloned().unwrap_or(Value::Null);
        let thrown = if is_error {
            Thrown::Error(serde_json::from_value::<ErrorInfo>(inner)?)
        } else {
            Thrown::Value(inner)
        };
        Ok(RpcValue::Thrown(thrown))
    }
}

/// Ordered handler registry.
pub struct Codec {
    handlers: Vec<Arc<dyn TransferHandler>>,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            handlers: vec![Arc::new(ProxyHandler), Arc::new(ThrowHandler)],
        }
    }
}

impl Codec {
    /// Codec with the built-in proxy and throw handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared default codec.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Append a handler. Earlier handlers take precedence.
    pub fn register(&mut self, handler: Arc<dyn TransferHandler>) {
        self.handlers.push(handler);
    }

    /// Names of registered handlers in consultation order.
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn encode(&self, value: RpcValue, ctx: &mut EncodeContext) -> Result<WireValue, RpcError> {
        if let Some(handler) = self.handlers.iter().find(|h| h.can_handle(&value)) {
            return Ok(WireValue::Handler {
                name: handler.name().to_string(),
                value: handler.serialize(value, ctx)?,
            });
        }

        match value {
            RpcValue::Plain(value) => Ok(WireValue::raw(value)),
            RpcValue::Transfer(transferable) => Ok(WireValue::Raw {
                value: Value::Null,
                transfer: Some(ctx.push_transfer(transferable)),
            }),
            RpcValue::Remote(_) => Err(RpcError::protocol(
                "a remote proxy cannot be sent; request an endpoint and transfer it instead",
            )),
            other => Err(RpcError::protocol(format!(
                "no handler registered for {}",
                other.kind()
            ))),
        }
    }

    /// Encode a thrown value. Falls back to a bare protocol error if the
    /// registered handlers reject it.
    pub fn encode_thrown(&self, thrown: Thrown, ctx: &mut EncodeContext) -> WireValue {
        match self.encode(RpcValue::Thrown(thrown), ctx) {
            Ok(wire) => wire,
            Err(e) => WireValue::Handler {
                name: THROW_HANDLER.to_string(),
                value: json!({
                    "isError": true,
                    "value": { "name": "ProtocolError", "message": e.to_string() },
                }),
            },
        }
    }

    pub fn decode(&self, wire: WireValue, ctx: &mut DecodeContext) -> Result<RpcValue, RpcError> {
        match wire {
            WireValue::Raw {
                value,
                transfer: None,
            } => Ok(RpcValue::Plain(value)),
            WireValue::Raw {
                transfer: Some(index),
                ..
            } => Ok(RpcValue::Transfer(ctx.take(index)?)),
            WireValue::Handler { name, value } => {
                let handler = self
                    .handlers
                    .iter()
                    .find(|h| h.name() == name)
                    .ok_or(RpcError::UnknownHandler(name))?;
                handler.deserialize(value, ctx)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::RemoteObject;
    use serde_json::json;

    struct Counter {
        count: i64,
    }

    impl RemoteObject for Counter {
        fn get(&self, name: &str) -> Result<RpcValue, Thrown> {
            match name {
                "count" => Ok(RpcValue::Plain(json!(self.count))),
                _ => Err(Thrown::type_error(format!("no property {}", name))),
            }
        }
    }

    fn decode_ctx(codec: &Arc<Codec>, transfer: Vec<Transferable>) -> DecodeContext {
        DecodeContext::new(transfer, Arc::clone(codec), None)
    }

    #[test]
    fn test_plain_values_round_trip() {
        let codec = Codec::shared();
        let samples = vec![
            json!(null),
            json!(true),
            json!(-17),
            json!(3.5),
            json!("word"),
            json!([1, "two", {"three": 3}]),
            json!({"rect": {"left": 1, "top": 2, "right": 3, "bottom": 4}, "flags": 3}),
        ];

        for sample in samples {
            let mut enc = EncodeContext::new();
            let wire = codec.encode(RpcValue::Plain(sample.clone()), &mut enc).unwrap();
            let (transfer, exposures) = enc.into_parts();
            assert!(transfer.is_empty());
            assert!(exposures.is_empty());

            let decoded = codec.decode(wire, &mut decode_ctx(&codec, transfer)).unwrap();
            assert_eq!(decoded.into_json::<Value>().unwrap(), sample);
        }
    }

    #[test]
    fn test_buffers_move_through_transfer_list() {
        let codec = Codec::shared();
        let mut enc = EncodeContext::new();
        let wire = codec.encode(RpcValue::bytes(vec![1, 2, 3]), &mut enc).unwrap();
        assert_eq!(
            wire,
            WireValue::Raw {
                value: Value::Null,
                transfer: Some(0)
            }
        );

        let (transfer, _) = enc.into_parts();
        let mut ctx = decode_ctx(&codec, transfer);
        let bytes = codec.decode(wire.clone(), &mut ctx).unwrap().into_bytes().unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);

        // The slot was consumed by the first decode.
        assert!(matches!(
            codec.decode(wire, &mut ctx),
            Err(RpcError::MissingTransfer(0))
        ));
    }

    #[test]
    fn test_error_like_thrown_values_preserve_fields() {
        let codec = Codec::shared();
        let thrown = Thrown::Error(ErrorInfo {
            name: "ModelLoadError".into(),
            message: "Text recognition model failed to load".into(),
            stack: Some("at load_model".into()),
        });

        let mut enc = EncodeContext::new();
        let wire = codec.encode(RpcValue::Thrown(thrown.clone()), &mut enc).unwrap();
        match &wire {
            WireValue::Handler { name, value } => {
                assert_eq!(name, THROW_HANDLER);
                assert_eq!(value["isError"], true);
                assert_eq!(value["value"]["stack"], "at load_model");
            }
            other => panic!("expected handler wire value, got {:?}", other),
        }

        let decoded = codec.decode(wire, &mut decode_ctx(&codec, vec![])).unwrap();
        match decoded.into_result() {
            Err(RpcError::Thrown(back)) => assert_eq!(back, thrown),
            other => panic!("expected re-raised error, got {:?}", other),
        }
    }

    #[test]
    fn test_opaque_thrown_values_pass_verbatim() {
        let codec = Codec::shared();
        let mut enc = EncodeContext::new();
        let wire = codec
            .encode(RpcValue::Thrown(Thrown::Value(json!({"code": 7}))), &mut enc)
            .unwrap();
        let decoded = codec.decode(wire, &mut decode_ctx(&codec, vec![])).unwrap();
        assert!(matches!(decoded, RpcValue::Thrown(Thrown::Value(v)) if v == json!({"code": 7})));
    }

    #[test]
    fn test_proxied_value_schedules_exposure_and_transfers_port() {
        let codec = Codec::shared();
        let mut enc = EncodeContext::new();
        let wire = codec
            .encode(RpcValue::proxied(Counter { count: 3 }), &mut enc)
            .unwrap();
        assert_eq!(
            wire,
            WireValue::Handler {
                name: PROXY_HANDLER.into(),
                value: json!({"port": 0})
            }
        );

        let (transfer, exposures) = enc.into_parts();
        assert_eq!(exposures.len(), 1);
        assert!(matches!(transfer.as_slice(), [Transferable::Port(_)]));

        let value = exposures[0].object.lock().get("count").unwrap();
        assert_eq!(value.into_json::<i64>().unwrap(), 3);
    }

    #[test]
    fn test_unknown_handler_is_a_protocol_error() {
        let codec = Codec::shared();
        let wire = WireValue::Handler {
            name: "teleport".into(),
            value: json!({}),
        };
        let err = codec
            .decode(wire, &mut decode_ctx(&codec, vec![]))
            .unwrap_err();
        assert!(matches!(err, RpcError::UnknownHandler(name) if name == "teleport"));
    }

    #[test]
    fn test_custom_handlers_are_consulted_after_builtins() {
        struct Upper;
        impl TransferHandler for Upper {
            fn name(&self) -> &'static str {
                "upper"
            }
            fn can_handle(&self, value: &RpcValue) -> bool {
                matches!(value, RpcValue::Plain(Value::String(_)))
            }
            fn serialize(&self, value: RpcValue, _: &mut EncodeContext) -> Result<Value, RpcError> {
                let s: String = value.into_json()?;
                Ok(Value::String(s.to_uppercase()))
            }
            fn deserialize(&self, value: Value, _: &mut DecodeContext) -> Result<RpcValue, RpcError> {
                Ok(RpcValue::Plain(value))
            }
        }

        let mut codec = Codec::new();
        codec.register(Arc::new(Upper));
        assert_eq!(codec.handler_names(), vec!["proxy", "throw", "upper"]);

        let codec = Arc::new(codec);
        let mut enc = EncodeContext::new();
        let wire = codec.encode(RpcValue::Plain(json!("line")), &mut enc).unwrap();
        let decoded = codec.decode(wire, &mut decode_ctx(&codec, vec![])).unwrap();
        assert_eq!(decoded.into_json::<String>().unwrap(), "LINE");
    }
}
