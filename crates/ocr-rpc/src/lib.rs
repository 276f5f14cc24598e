//! OCR Lane RPC Substrate
//!
//! Lets a caller drive an object that lives in another execution context
//! (a worker thread) as if it were local. The pieces, leaf first:
//!
//! - [`message`]: wire types (requests, responses, wire values, envelopes)
//! - [`codec`]: encodes values into wire values and back, with named
//!   handlers for proxied objects and thrown errors
//! - [`endpoint`]: bidirectional message ports that move transferables
//! - [`dispatcher`]: serves requests against exposed root objects
//! - [`proxy`]: client-side stand-ins that turn calls into requests

pub mod codec;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod proxy;
pub mod value;

pub use codec::{Codec, DecodeContext, EncodeContext, Exposure, TransferHandler};
pub use dispatcher::{expose, Arguments, EventLoop, RemoteObject, SharedObject};
pub use endpoint::{Endpoint, MessageChannel, MessagePort};
pub use error::{RpcError, TransportError};
pub use message::{Envelope, Message, MessageType, ProgressEvent, Request, Response, WireValue};
pub use proxy::{Connection, PendingReply, RemoteProxy};
pub use value::{ErrorInfo, Proxied, RpcValue, Thrown, Transferable};

/// Handler name for values marked as proxyable.
pub const PROXY_HANDLER: &str = "proxy";

/// Handler name for thrown values.
pub const THROW_HANDLER: &str = "throw";
