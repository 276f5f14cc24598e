//! Endpoint Transport
//!
//! Abstracts a bidirectional, message-based channel between two execution
//! contexts. Provides:
//! - Endpoint trait: post/receive with transferables, start, close
//! - MessagePort: in-process port built on crossbeam channels

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::TransportError;
use crate::message::Envelope;

static NEXT_PORT_ID: AtomicU64 = AtomicU64::new(1);

/// Bidirectional message channel.
pub trait Endpoint: Send + Sync {
    /// Send an envelope; its transferables move to the peer.
    fn post_message(&self, envelope: Envelope) -> Result<(), TransportError>;

    /// Receiving half, for event loops that multiplex several endpoints.
    fn receiver(&self) -> &Receiver<Envelope>;

    /// Activate delivery. Ports deliver immediately, so this is a no-op by default.
    fn start(&self) {}

    /// Stop sending. The peer observes a disconnect once it drains its queue.
    fn close(&self);

    /// Whether `close` has been called.
    fn is_closed(&self) -> bool;
}

/// One end of an in-process [`MessageChannel`].
pub struct MessagePort {
    id: u64,
    sender: Mutex<Option<Sender<Envelope>>>,
    receiver: Receiver<Envelope>,
}

impl MessagePort {
    /// Process-unique id, used in log output.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Endpoint for MessagePort {
    fn post_message(&self, envelope: Envelope) -> Result<(), TransportError> {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(TransportError::Closed)?;
        trace!(port = self.id, "post message");
        sender
            .send(envelope)
            .map_err(|_| TransportError::Disconnected)
    }

    fn receiver(&self) -> &Receiver<Envelope> {
        &self.receiver
    }

    fn close(&self) {
        if self.sender.lock().take().is_some() {
            debug!(port = self.id, "port closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl fmt::Debug for MessagePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagePort")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Factory for entangled port pairs.
pub struct MessageChannel;

impl MessageChannel {
    /// Create two ports; whatever one posts the other receives.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (MessagePort, MessagePort) {
        let (a_tx, a_rx) = unbounded();
        let (b_tx, b_rx) = unbounded();
        let first = MessagePort {
            id: NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed),
            sender: Mutex::new(Some(a_tx)),
            receiver: b_rx,
        };
        let second = MessagePort {
            id: NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed),
            sender: Mutex::new(Some(b_tx)),
            receiver: a_rx,
        };
        (first, second)
    }
}
