//! Request Dispatcher
//!
//! Serves [`RemoteObject`]s over ports. Each exposed object is paired with
//! the port it listens on; one [`EventLoop`] multiplexes any number of these
//! exposures on a single thread and handles requests in arrival order.
//!
//! Exposures are added when:
//! - the loop is seeded with a root object
//! - a reply carries a proxied object (served on a fresh sub-channel)
//! - an ENDPOINT request asks for another port onto the same object
//!
//! An exposure is dropped after it answers RELEASE, or when its peer
//! disconnects. The loop returns once no exposures are left.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Select;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::codec::{Codec, DecodeContext, EncodeContext, Exposure};
use crate::endpoint::{Endpoint, MessageChannel, MessagePort};
use crate::error::{RpcError, TransportError};
use crate::message::{Envelope, Message, MessageType, Request, Response, WireValue};
use crate::value::{Proxied, RpcValue, Thrown};

/// An object whose members can be driven from another execution context.
///
/// Every operation defaults to throwing a `TypeError`, so implementors only
/// provide the members they actually have.
pub trait RemoteObject: Send {
    /// Nested object reachable through property `name`, used to walk request paths.
    fn child(&mut self, name: &str) -> Option<&mut dyn RemoteObject> {
        let _ = name;
        None
    }

    /// Read property `name`.
    fn get(&self, name: &str) -> Result<RpcValue, Thrown> {
        Err(Thrown::type_error(format!("Property {} is not readable", name)))
    }

    /// Assign property `name`.
    fn set(&mut self, name: &str, value: RpcValue) -> Result<(), Thrown> {
        let _ = value;
        Err(Thrown::type_error(format!("Property {} is not writable", name)))
    }

    /// Call method `name`.
    fn apply(&mut self, name: &str, args: Arguments) -> Result<RpcValue, Thrown> {
        let _ = args;
        Err(Thrown::type_error(format!("{} is not a function", name)))
    }

    /// Construct an instance of the class exposed as `name`.
    fn construct(&mut self, name: &str, args: Arguments) -> Result<Proxied, Thrown> {
        let _ = args;
        Err(Thrown::type_error(format!("{} is not a constructor", name)))
    }

    /// Plain snapshot returned for a GET on the object itself.
    fn describe(&self) -> Result<Value, Thrown> {
        Ok(Value::Null)
    }
}

/// An exposed object, shared between the exposures that serve it.
pub type SharedObject = Arc<Mutex<dyn RemoteObject>>;

/// Decoded argument list of an APPLY or CONSTRUCT request.
#[derive(Debug, Default)]
pub struct Arguments {
    values: Vec<Option<RpcValue>>,
}

impl Arguments {
    pub fn new(values: Vec<RpcValue>) -> Self {
        Self {
            values: values.into_iter().map(Some).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Take argument `index`. Absent arguments and those already taken yield `None`.
    pub fn take(&mut self, index: usize) -> Option<RpcValue> {
        self.values.get_mut(index).and_then(Option::take)
    }

    /// Take argument `index`, treating null like an absent argument.
    pub fn take_present(&mut self, index: usize) -> Option<RpcValue> {
        self.take(index).filter(|value| !value.is_null())
    }

    fn required(&mut self, index: usize, name: &str) -> Result<RpcValue, Thrown> {
        self.take(index)
            .ok_or_else(|| Thrown::type_error(format!("Missing argument: {}", name)))
    }

    /// Required plain argument.
    pub fn json<T: DeserializeOwned>(&mut self, index: usize, name: &str) -> Result<T, Thrown> {
        self.required(index, name)?
            .into_json()
            .map_err(|e| argument_error(name, e))
    }

    /// Optional plain argument; absent and null both give `None`.
    pub fn optional_json<T: DeserializeOwned>(
        &mut self,
        index: usize,
        name: &str,
    ) -> Result<Option<T>, Thrown> {
        self.take_present(index)
            .map(|value| value.into_json().map_err(|e| argument_error(name, e)))
            .transpose()
    }

    /// Required transferred buffer.
    pub fn bytes(&mut self, index: usize, name: &str) -> Result<Vec<u8>, Thrown> {
        self.required(index, name)?
            .into_bytes()
            .map_err(|e| argument_error(name, e))
    }

    /// Optional transferred buffer; absent and null both give `None`.
    pub fn optional_bytes(&mut self, index: usize, name: &str) -> Result<Option<Vec<u8>>, Thrown> {
        self.take_present(index)
            .map(|value| value.into_bytes().map_err(|e| argument_error(name, e)))
            .transpose()
    }

    /// Optional transferred port; absent and null both give `None`.
    pub fn optional_port(&mut self, index: usize, name: &str) -> Result<Option<MessagePort>, Thrown> {
        self.take_present(index)
            .map(|value| value.into_port().map_err(|e| argument_error(name, e)))
            .transpose()
    }
}

fn argument_error(name: &str, error: RpcError) -> Thrown {
    match error {
        RpcError::Thrown(thrown) => thrown,
        other => Thrown::type_error(format!("Invalid argument {}: {}", name, other)),
    }
}

/// Walk `path` from `root` through [`RemoteObject::child`].
fn resolve<'a>(
    root: &'a mut dyn RemoteObject,
    path: &[String],
) -> Result<&'a mut dyn RemoteObject, Thrown> {
    let mut current = root;
    for segment in path {
        current = current
            .child(segment)
            .ok_or_else(|| Thrown::type_error(format!("Cannot read property {} of undefined", segment)))?;
    }
    Ok(current)
}

fn split_target<'p>(path: &'p [String], kind: MessageType) -> Result<(&'p String, &'p [String]), Thrown> {
    path.split_last()
        .ok_or_else(|| Thrown::type_error(format!("{} requires a non-empty path", kind)))
}

/// Single-threaded loop serving every exposure it owns.
pub struct EventLoop {
    codec: Arc<Codec>,
    exposures: Vec<Exposure>,
}

impl EventLoop {
    pub fn new(codec: Arc<Codec>) -> Self {
        Self {
            codec,
            exposures: Vec::new(),
        }
    }

    /// Serve `object` on `port`.
    pub fn expose(&mut self, object: SharedObject, port: MessagePort) {
        debug!(port = port.id(), "exposing object");
        port.start();
        self.exposures.push(Exposure { object, port });
    }

    /// Number of live exposures.
    pub fn exposure_count(&self) -> usize {
        self.exposures.len()
    }

    /// Handle requests until every exposure is released or disconnected.
    pub fn run(mut self) {
        while !self.exposures.is_empty() {
            let (index, received) = {
                let mut select = Select::new();
                for exposure in &self.exposures {
                    select.recv(exposure.port.receiver());
                }
                let operation = select.select();
                let index = operation.index();
                let received = operation.recv(self.exposures[index].port.receiver());
                (index, received)
            };

            match received {
                Ok(envelope) => self.handle(index, envelope),
                Err(_) => {
                    let exposure = self.exposures.swap_remove(index);
                    debug!(port = exposure.port.id(), "peer disconnected, dropping exposure");
                }
            }
        }
        debug!("event loop finished, no exposures left");
    }

    fn handle(&mut self, index: usize, envelope: Envelope) {
        let Envelope { message, transfer } = envelope;
        let request = match message {
            Message::Request(request) => request,
            other => {
                trace!(?other, "ignoring non-request message");
                return;
            }
        };
        if request.kind == MessageType::Unknown {
            warn!(id = %request.id, "ignoring request with unknown type");
            return;
        }

        let id = request.id.clone();
        let kind = request.kind;
        trace!(id = %id, %kind, path = ?request.path, "handling request");

        let object = Arc::clone(&self.exposures[index].object);
        let mut decode = DecodeContext::new(transfer, Arc::clone(&self.codec), None);
        let mut created = Vec::new();
        let outcome = self.perform(&object, request, &mut decode, &mut created);

        let mut encode = EncodeContext::new();
        let value = match outcome {
            Ok(value) => match self.codec.encode(value, &mut encode) {
                Ok(wire) => wire,
                Err(e) => {
                    encode = EncodeContext::new();
                    self.codec.encode_thrown(e.into(), &mut encode)
                }
            },
            Err(thrown) => {
                debug!(id = %id, %kind, error = %thrown, "request threw");
                self.codec.encode_thrown(thrown, &mut encode)
            }
        };
        let (transfer, exposures) = encode.into_parts();
        created.extend(exposures);

        let reply = Envelope::with_transfer(Message::Response(Response { id, value }), transfer);
        if let Err(e) = self.exposures[index].port.post_message(reply) {
            warn!(port = self.exposures[index].port.id(), error = %e, "failed to post response");
        }

        for exposure in created {
            self.expose(exposure.object, exposure.port);
        }

        if kind == MessageType::Release {
            let exposure = self.exposures.swap_remove(index);
            exposure.port.close();
            debug!(port = exposure.port.id(), "exposure released");
        }
    }

    fn perform(
        &self,
        object: &SharedObject,
        request: Request,
        decode: &mut DecodeContext,
        created: &mut Vec<Exposure>,
    ) -> Result<RpcValue, Thrown> {
        let Request {
            kind,
            path,
            argument_list,
            value,
            ..
        } = request;

        match kind {
            MessageType::Endpoint => {
                let (local, remote) = MessageChannel::new();
                created.push(Exposure {
                    object: Arc::clone(object),
                    port: local,
                });
                return Ok(RpcValue::port(remote));
            }
            MessageType::Release => return Ok(RpcValue::null()),
            MessageType::Unknown => {
                return Err(Thrown::type_error("Unknown request type"));
            }
            _ => {}
        }

        let arguments = self.decode_all(argument_list.unwrap_or_default(), decode)?;
        let mut guard = object.lock();
        let root: &mut dyn RemoteObject = &mut *guard;

        match kind {
            MessageType::Get => match path.split_last() {
                None => root.describe().map(RpcValue::Plain),
                Some((name, parents)) => resolve(root, parents)?.get(name),
            },
            MessageType::Set => {
                let (name, parents) = split_target(&path, kind)?;
                let wire = value.unwrap_or_else(|| WireValue::raw(Value::Null));
                let value = self.codec.decode(wire, decode)?;
                resolve(root, parents)?.set(name, value)?;
                Ok(RpcValue::null())
            }
            MessageType::Apply => {
                let (name, parents) = split_target(&path, kind)?;
                resolve(root, parents)?.apply(name, Arguments::new(arguments))
            }
            MessageType::Construct => {
                let (name, parents) = split_target(&path, kind)?;
                let instance = resolve(root, parents)?.construct(name, Arguments::new(arguments))?;
                Ok(RpcValue::Proxied(instance))
            }
            MessageType::Endpoint | MessageType::Release | MessageType::Unknown => {
                Ok(RpcValue::null())
            }
        }
    }

    fn decode_all(
        &self,
        wires: Vec<WireValue>,
        decode: &mut DecodeContext,
    ) -> Result<Vec<RpcValue>, RpcError> {
        wires
            .into_iter()
            .map(|wire| self.codec.decode(wire, decode))
            .collect()
    }
}

/// Serve `object` on `port` from a new thread.
pub fn expose(
    object: SharedObject,
    port: MessagePort,
    codec: Arc<Codec>,
) -> Result<JoinHandle<()>, TransportError> {
    let name = format!("rpc-expose-{}", port.id());
    let mut event_loop = EventLoop::new(codec);
    event_loop.expose(object, port);
    thread::Builder::new()
        .name(name)
        .spawn(move || event_loop.run())
        .map_err(|e| TransportError::Spawn(e.to_string()))
}
