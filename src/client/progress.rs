//! Progress side channel.
//!
//! The worker streams `{progress}` events on a dedicated port. A pump thread
//! fans each event out to every registered listener; listeners are not tied
//! to a particular call, since one client runs one expensive operation at a
//! time.
//!
//! Progress and replies travel on different ports, so a reply can overtake
//! the last events of its own call. The worker posts every progress event
//! before the reply, so [`ProgressChannel::flush`] after the reply arrives
//! delivers whatever is still queued.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use ocr_rpc::{Endpoint, Envelope, Message, MessagePort};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::ClientError;

/// Progress callback, called with values in `0..=100`.
pub type ProgressCallback = Box<dyn FnMut(u8) + Send>;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Default)]
struct Registry {
    next_id: u64,
    callbacks: Vec<(u64, ProgressCallback)>,
}

/// Registered progress listeners.
#[derive(Clone, Default)]
pub struct ProgressListeners {
    registry: Arc<Mutex<Registry>>,
}

impl ProgressListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` until the returned guard is dropped.
    ///
    /// Callbacks run while the registry is locked and must not register or
    /// drop listeners themselves.
    pub fn register(&self, callback: ProgressCallback) -> ListenerGuard {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.callbacks.push((id, callback));
        ListenerGuard {
            listeners: self.clone(),
            id,
        }
    }

    /// Deliver `progress` to every listener.
    pub fn dispatch(&self, progress: u8) {
        for (_, callback) in self.registry.lock().callbacks.iter_mut() {
            callback(progress);
        }
    }

    pub fn len(&self) -> usize {
        self.registry.lock().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: u64) {
        self.registry.lock().callbacks.retain(|(other, _)| *other != id);
    }
}

/// Keeps a listener registered. Dropping it unregisters the listener.
pub struct ListenerGuard {
    listeners: ProgressListeners,
    id: u64,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.listeners.remove(self.id);
    }
}

impl fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerGuard").field("id", &self.id).finish()
    }
}

/// Host end of the progress port plus the pump that drains it.
pub struct ProgressChannel {
    port: Arc<MessagePort>,
    listeners: ProgressListeners,
    // Held by the pump while it receives and dispatches one event.
    gate: Arc<Mutex<()>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl ProgressChannel {
    /// Start pumping events arriving on `port`.
    pub fn open(port: MessagePort) -> Result<Self, ClientError> {
        port.start();
        let port = Arc::new(port);
        let listeners = ProgressListeners::new();
        let gate = Arc::new(Mutex::new(()));

        let pump = {
            let port = Arc::clone(&port);
            let listeners = listeners.clone();
            let gate = Arc::clone(&gate);
            thread::Builder::new()
                .name(format!("ocr-progress-{}", port.id()))
                .spawn(move || pump(&port, &listeners, &gate))
                .map_err(|e| ClientError::WorkerSpawn(e.to_string()))?
        };

        Ok(Self {
            port,
            listeners,
            gate,
            pump: Mutex::new(Some(pump)),
        })
    }

    pub fn listeners(&self) -> &ProgressListeners {
        &self.listeners
    }

    /// Deliver every event already queued on the port.
    pub fn flush(&self) {
        let _gate = self.gate.lock();
        while let Ok(envelope) = self.port.receiver().try_recv() {
            deliver(&self.listeners, envelope);
        }
    }

    /// Stop sending on the host end. The pump ends once the worker drops
    /// its end.
    pub fn close(&self) {
        self.port.close();
    }

    /// Whether the pump thread has stopped.
    pub fn is_finished(&self) -> bool {
        self.pump
            .lock()
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for ProgressChannel {
    fn drop(&mut self) {
        self.close();
        // Detach; the pump exits on its own once the worker end is gone.
        drop(self.pump.lock().take());
    }
}

fn pump(port: &MessagePort, listeners: &ProgressListeners, gate: &Mutex<()>) {
    loop {
        let _gate = gate.lock();
        match port.receiver().recv_timeout(POLL_INTERVAL) {
            Ok(envelope) => deliver(listeners, envelope),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(port = port.id(), "progress channel closed");
}

fn deliver(listeners: &ProgressListeners, envelope: Envelope) {
    match envelope.message {
        Message::Progress(event) => {
            trace!(progress = event.progress, "progress");
            listeners.dispatch(event.progress);
        }
        other => trace!(kind = ?other, "ignoring non-progress message"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocr_rpc::{MessageChannel, ProgressEvent};
    use std::sync::mpsc;

    fn post(port: &MessagePort, progress: u8) {
        port.post_message(Envelope::new(Message::Progress(ProgressEvent { progress })))
            .unwrap();
    }

    fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (Box::new(move |p| sink.lock().push(p)), seen)
    }

    #[test]
    fn test_dispatch_fans_out_to_all_listeners() {
        let listeners = ProgressListeners::new();
        let (first, first_seen) = recorder();
        let (second, second_seen) = recorder();
        let _a = listeners.register(first);
        let _b = listeners.register(second);

        listeners.dispatch(40);
        assert_eq!(*first_seen.lock(), vec![40]);
        assert_eq!(*second_seen.lock(), vec![40]);
    }

    #[test]
    fn test_guard_drop_unregisters() {
        let listeners = ProgressListeners::new();
        let (callback, seen) = recorder();
        let guard = listeners.register(callback);
        assert_eq!(listeners.len(), 1);

        drop(guard);
        assert!(listeners.is_empty());
        listeners.dispatch(100);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_flush_delivers_queued_events_in_order() {
        let (host, worker) = MessageChannel::new();
        let channel = ProgressChannel::open(host).unwrap();
        let (callback, seen) = recorder();
        let _guard = channel.listeners().register(callback);

        for progress in [0, 50, 100] {
            post(&worker, progress);
        }
        channel.flush();
        assert_eq!(*seen.lock(), vec![0, 50, 100]);
    }

    #[test]
    fn test_pump_delivers_without_flush() {
        let (host, worker) = MessageChannel::new();
        let channel = ProgressChannel::open(host).unwrap();
        let (tx, rx) = mpsc::channel();
        let _guard = channel.listeners().register(Box::new(move |p| {
            let _ = tx.send(p);
        }));

        post(&worker, 25);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 25);
    }

    #[test]
    fn test_pump_stops_when_worker_end_is_dropped() {
        let (host, worker) = MessageChannel::new();
        let channel = ProgressChannel::open(host).unwrap();
        drop(worker);
        for _ in 0..200 {
            if channel.is_finished() {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
        assert!(channel.is_finished());
    }
}
