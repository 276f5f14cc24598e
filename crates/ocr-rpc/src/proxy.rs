//! Remote proxies.
//!
//! A [`Connection`] owns one port to a dispatcher. Requests are tagged with a
//! fresh uuid and registered in a pending map before they are posted; a pump
//! thread routes each response to the waiter with the matching id. Responses
//! with unknown ids are dropped. When the peer disconnects, every pending
//! waiter fails with [`RpcError::Disconnected`].
//!
//! A [`RemoteProxy`] is a connection plus a property path. Member access is
//! local and only extends the path; nothing is sent until an operation runs.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::codec::{Codec, DecodeContext, EncodeContext};
use crate::dispatcher;
use crate::endpoint::{Endpoint, MessagePort};
use crate::error::{RpcError, TransportError};
use crate::message::{Envelope, Message, MessageType, Request, Response};
use crate::value::{RpcValue, Transferable};

type Delivery = (Response, Vec<Transferable>);
type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Delivery>>>>;

struct Shared {
    port: MessagePort,
    pending: PendingMap,
    released: AtomicBool,
    codec: Arc<Codec>,
    timeout: Option<Duration>,
}

/// Request/response channel to one exposed object.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Start routing responses arriving on `port`.
    ///
    /// `timeout` bounds how long each reply is awaited; `None` waits until the
    /// reply arrives or the peer disconnects.
    pub fn open(
        port: MessagePort,
        codec: Arc<Codec>,
        timeout: Option<Duration>,
    ) -> Result<Self, RpcError> {
        port.start();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let receiver = port.receiver().clone();
        let routes = Arc::clone(&pending);
        let port_id = port.id();

        thread::Builder::new()
            .name(format!("rpc-proxy-{}", port_id))
            .spawn(move || {
                for envelope in receiver.iter() {
                    let Envelope { message, transfer } = envelope;
                    match message {
                        Message::Response(response) => {
                            let waiter = routes.lock().remove(&response.id);
                            match waiter {
                                Some(waiter) => {
                                    let _ = waiter.send((response, transfer));
                                }
                                None => {
                                    trace!(port = port_id, id = %response.id, "dropping response with unknown id")
                                }
                            }
                        }
                        other => trace!(port = port_id, ?other, "ignoring non-response message"),
                    }
                }
                let abandoned = {
                    let mut routes = routes.lock();
                    let count = routes.len();
                    routes.clear();
                    count
                };
                if abandoned > 0 {
                    warn!(port = port_id, abandoned, "peer disconnected with requests in flight");
                } else {
                    debug!(port = port_id, "peer disconnected");
                }
            })
            .map_err(|e| TransportError::Spawn(e.to_string()))?;

        Ok(Self {
            shared: Arc::new(Shared {
                port,
                pending,
                released: AtomicBool::new(false),
                codec,
                timeout,
            }),
        })
    }

    pub fn port_id(&self) -> u64 {
        self.shared.port.id()
    }

    pub fn is_released(&self) -> bool {
        self.shared.released.load(Ordering::SeqCst)
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Stop sending on this connection without notifying the peer.
    pub fn close(&self) {
        self.shared.port.close();
    }

    /// Encode and post a request. The returned handle resolves with the reply.
    pub fn request(
        &self,
        kind: MessageType,
        path: Vec<String>,
        arguments: Vec<RpcValue>,
        value: Option<RpcValue>,
    ) -> Result<PendingReply, RpcError> {
        if self.is_released() {
            return Err(RpcError::Released);
        }
        self.post(kind, path, arguments, value)
    }

    fn post(
        &self,
        kind: MessageType,
        path: Vec<String>,
        arguments: Vec<RpcValue>,
        value: Option<RpcValue>,
    ) -> Result<PendingReply, RpcError> {
        let codec = &self.shared.codec;
        let mut encode = EncodeContext::new();
        let id = Uuid::new_v4().to_string();
        let mut request = Request::new(id.clone(), kind, path);
        if matches!(kind, MessageType::Apply | MessageType::Construct) {
            let wires = arguments
                .into_iter()
                .map(|argument| codec.encode(argument, &mut encode))
                .collect::<Result<Vec<_>, _>>()?;
            request = request.with_arguments(wires);
        }
        if let Some(value) = value {
            request = request.with_value(codec.encode(value, &mut encode)?);
        }
        let (transfer, exposures) = encode.into_parts();

        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id.clone(), tx);

        trace!(port = self.port_id(), id = %id, %kind, path = ?request.path, "posting request");
        let posted = self
            .shared
            .port
            .post_message(Envelope::with_transfer(Message::Request(request), transfer));
        if let Err(e) = posted {
            self.shared.pending.lock().remove(&id);
            return Err(e.into());
        }

        for exposure in exposures {
            dispatcher::expose(exposure.object, exposure.port, Arc::clone(codec))?;
        }

        Ok(PendingReply {
            id,
            rx,
            pending: Arc::clone(&self.shared.pending),
            codec: Arc::clone(codec),
            timeout: self.shared.timeout,
        })
    }

    fn mark_released(&self) -> bool {
        !self.shared.released.swap(true, Ordering::SeqCst)
    }
}

/// A posted request awaiting its response.
pub struct PendingReply {
    id: String,
    rx: oneshot::Receiver<Delivery>,
    pending: PendingMap,
    codec: Arc<Codec>,
    timeout: Option<Duration>,
}

impl PendingReply {
    /// Correlation id of the request.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the reply and decode it. Thrown values are re-raised as
    /// [`RpcError::Thrown`].
    pub async fn wait(mut self) -> Result<RpcValue, RpcError> {
        let limit = self.timeout;
        match self.wait_for(limit).await? {
            Some(value) => Ok(value),
            None => {
                self.pending.lock().remove(&self.id);
                Err(RpcError::Timeout(self.id))
            }
        }
    }

    /// Wait up to `limit` for the reply without abandoning the request.
    ///
    /// `Ok(None)` means nothing arrived in time; the request stays pending and
    /// may be awaited again. Once this returns anything else the reply is
    /// consumed and the handle must not be awaited again.
    pub async fn wait_for(
        &mut self,
        limit: Option<Duration>,
    ) -> Result<Option<RpcValue>, RpcError> {
        let delivered = match limit {
            Some(limit) => match tokio::time::timeout(limit, &mut self.rx).await {
                Ok(delivered) => delivered,
                Err(_) => return Ok(None),
            },
            None => (&mut self.rx).await,
        };
        let (response, transfer) = delivered.map_err(|_| RpcError::Disconnected)?;
        let mut decode = DecodeContext::new(transfer, Arc::clone(&self.codec), self.timeout);
        self.codec
            .decode(response.value, &mut decode)?
            .into_result()
            .map(Some)
    }
}

impl fmt::Debug for PendingReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingReply").field("id", &self.id).finish()
    }
}

/// Handle to an object exposed on the other side of a port.
#[derive(Clone)]
pub struct RemoteProxy {
    connection: Connection,
    path: Vec<String>,
}

impl RemoteProxy {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            path: Vec::new(),
        }
    }

    /// Proxy the object exposed on `port`, using the default codec and no timeout.
    pub fn wrap(port: MessagePort) -> Result<Self, RpcError> {
        Self::wrap_with(port, Codec::shared(), None)
    }

    pub fn wrap_with(
        port: MessagePort,
        codec: Arc<Codec>,
        timeout: Option<Duration>,
    ) -> Result<Self, RpcError> {
        Ok(Self::new(Connection::open(port, codec, timeout)?))
    }

    /// Proxy for property `name`. No message is sent.
    pub fn member(&self, name: &str) -> RemoteProxy {
        let mut path = self.path.clone();
        path.push(name.to_string());
        Self {
            connection: self.connection.clone(),
            path,
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn is_released(&self) -> bool {
        self.connection.is_released()
    }

    /// Read the value at this path.
    pub async fn get(&self) -> Result<RpcValue, RpcError> {
        self.send(MessageType::Get, Vec::new(), None)?.wait().await
    }

    /// Assign the value at this path.
    pub async fn set(&self, value: RpcValue) -> Result<(), RpcError> {
        self.send(MessageType::Set, Vec::new(), Some(value))?
            .wait()
            .await
            .map(drop)
    }

    /// Call the function at this path.
    pub async fn apply(&self, arguments: Vec<RpcValue>) -> Result<RpcValue, RpcError> {
        self.send_apply(arguments)?.wait().await
    }

    /// Post an APPLY without waiting for the reply.
    pub fn send_apply(&self, arguments: Vec<RpcValue>) -> Result<PendingReply, RpcError> {
        self.send(MessageType::Apply, arguments, None)
    }

    /// Call method `name` of the object at this path.
    pub async fn call(&self, name: &str, arguments: Vec<RpcValue>) -> Result<RpcValue, RpcError> {
        self.member(name).apply(arguments).await
    }

    /// Construct the class at this path and proxy the new instance.
    pub async fn construct(&self, arguments: Vec<RpcValue>) -> Result<RemoteProxy, RpcError> {
        self.send(MessageType::Construct, arguments, None)?
            .wait()
            .await?
            .into_remote()
    }

    /// Open a second connection onto the same exposed object.
    ///
    /// The new proxy shares this one's codec and timeout but not its
    /// released flag.
    pub async fn endpoint(&self) -> Result<RemoteProxy, RpcError> {
        let port = self
            .send(MessageType::Endpoint, Vec::new(), None)?
            .wait()
            .await?
            .into_port()?;
        let shared = &self.connection.shared;
        Self::wrap_with(port, Arc::clone(&shared.codec), shared.timeout)
    }

    /// Tell the peer to stop serving this connection, then close it.
    ///
    /// Releasing applies to every proxy sharing the connection. Later
    /// operations fail with [`RpcError::Released`] without sending anything.
    pub async fn release(&self) -> Result<(), RpcError> {
        if !self.connection.mark_released() {
            return Err(RpcError::Released);
        }
        let pending = match self
            .connection
            .post(MessageType::Release, self.path.clone(), Vec::new(), None)
        {
            Ok(pending) => pending,
            Err(e) => {
                self.connection.close();
                return Err(e);
            }
        };
        let outcome = pending.wait().await;
        self.connection.close();
        match outcome {
            Ok(_) | Err(RpcError::Disconnected) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Stop sending on this connection without notifying the peer.
    pub fn close(&self) {
        self.connection.close();
    }

    fn send(
        &self,
        kind: MessageType,
        arguments: Vec<RpcValue>,
        value: Option<RpcValue>,
    ) -> Result<PendingReply, RpcError> {
        self.connection
            .request(kind, self.path.clone(), arguments, value)
    }
}

impl fmt::Debug for RemoteProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteProxy")
            .field("port", &self.connection.port_id())
            .field("path", &self.path)
            .field("released", &self.is_released())
            .finish()
    }
}
