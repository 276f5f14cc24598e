//! Worker entry point.
//!
//! A worker is one thread running one [`EventLoop`]. The root [`WorkerApi`]
//! is exposed on the port handed to [`run`]; sessions it creates are served
//! by the same loop, so every request to the worker is handled on its thread
//! in arrival order. The loop ends once the host has dropped or released
//! every port, and the thread exits with it.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use ocr_rpc::{Codec, EventLoop, MessagePort, Proxied};
use tracing::info;

use crate::api::WorkerApi;
use crate::config::WorkerConfig;
use crate::engine::EngineFactory;

/// Serve the worker API on `port` until every exposure is gone.
pub fn run(port: MessagePort, factory: Arc<dyn EngineFactory>, config: WorkerConfig) {
    info!(thread = %config.thread_name, port = port.id(), "worker started");
    let mut event_loop = EventLoop::new(Codec::shared());
    event_loop.expose(Proxied::new(WorkerApi::new(factory, config)).0, port);
    event_loop.run();
    info!("worker stopped");
}

/// Run a worker on a new named thread.
pub fn spawn(
    port: MessagePort,
    factory: Arc<dyn EngineFactory>,
    config: WorkerConfig,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(config.thread_name.clone())
        .spawn(move || run(port, factory, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockEngineFactory;
    use ocr_rpc::{Endpoint, Envelope, Message, MessageChannel, MessageType, Request, WireValue};
    use std::time::Duration;

    #[test]
    fn test_worker_exits_when_host_drops_port() {
        let (host, worker) = MessageChannel::new();
        let handle = spawn(worker, Arc::new(MockEngineFactory::new()), WorkerConfig::default()).unwrap();
        assert_eq!(handle.thread().name(), Some("ocr-worker"));
        drop(host);
        handle.join().unwrap();
    }

    #[test]
    fn test_worker_serves_sessions_on_its_own_loop() {
        let (host, worker) = MessageChannel::new();
        let handle = spawn(worker, Arc::new(MockEngineFactory::new()), WorkerConfig::default()).unwrap();

        let request = Request::new("1", MessageType::Apply, vec!["createOCREngine".into()])
            .with_arguments(vec![WireValue::raw(serde_json::Value::Null)]);
        host.post_message(Envelope::new(Message::Request(request))).unwrap();
        let reply = host.receiver().recv_timeout(Duration::from_secs(2)).unwrap();
        match &reply.message {
            Message::Response(response) => assert!(matches!(
                &response.value,
                WireValue::Handler { name, .. } if name == "proxy"
            )),
            other => panic!("unexpected reply {:?}", other),
        }
        assert_eq!(reply.transfer.len(), 1);

        // The session port keeps the loop alive until it is dropped as well.
        drop(host);
        drop(reply);
        handle.join().unwrap();
    }
}
