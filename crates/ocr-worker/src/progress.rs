//! Progress reporting for long-running recognition.
//!
//! Raw engine progress is noisy. [`ProgressReporter`] turns it into the
//! sequence callers rely on: values in [0, 100], strictly increasing, ending
//! at exactly 100. Each accepted value goes to the local callback (if any)
//! and to the progress port (if any).

use ocr_rpc::{Endpoint, Message, MessagePort, ProgressEvent};
use tracing::trace;

pub struct ProgressReporter<'a, 'f> {
    last: Option<u8>,
    local: Option<&'a mut (dyn FnMut(u8) + 'f)>,
    port: Option<&'a MessagePort>,
}

impl<'a, 'f> ProgressReporter<'a, 'f> {
    pub fn new(local: Option<&'a mut (dyn FnMut(u8) + 'f)>, port: Option<&'a MessagePort>) -> Self {
        Self {
            last: None,
            local,
            port,
        }
    }

    /// Last value passed on, if any.
    pub fn last(&self) -> Option<u8> {
        self.last
    }

    /// Report a raw progress value. Values that are not above the last
    /// reported one are dropped.
    pub fn report(&mut self, raw: i32) {
        let value = raw.clamp(0, 100) as u8;
        if self.last.is_some_and(|last| value <= last) {
            return;
        }
        self.emit(value);
    }

    /// Make sure the sequence ends at 100.
    pub fn finish(mut self) {
        if self.last != Some(100) {
            self.emit(100);
        }
    }

    fn emit(&mut self, value: u8) {
        self.last = Some(value);
        if let Some(local) = self.local.as_deref_mut() {
            local(value);
        }
        if let Some(port) = self.port {
            let event = Message::Progress(ProgressEvent { progress: value });
            // A client that stopped listening is not an error for the session.
            if let Err(e) = port.post_message(event.into()) {
                trace!(error = %e, "progress port unavailable");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocr_rpc::MessageChannel;
    use std::time::Duration;

    fn collect(raw: &[i32]) -> Vec<u8> {
        let mut seen = Vec::new();
        {
            let mut push = |value: u8| seen.push(value);
            let mut reporter = ProgressReporter::new(Some(&mut push as &mut dyn FnMut(u8)), None);
            for value in raw {
                reporter.report(*value);
            }
            reporter.finish();
        }
        seen
    }

    #[test]
    fn test_sequence_is_clamped_increasing_and_terminal() {
        assert_eq!(collect(&[-5, 0, 10, 10, 7, 55, 140]), vec![0, 10, 55, 100]);
    }

    #[test]
    fn test_finish_adds_missing_terminal_value() {
        assert_eq!(collect(&[20, 60]), vec![20, 60, 100]);
        assert_eq!(collect(&[]), vec![100]);
    }

    #[test]
    fn test_values_reach_the_progress_port() {
        let (worker_end, client_end) = MessageChannel::new();
        let mut reporter = ProgressReporter::new(None, Some(&worker_end));
        reporter.report(40);
        reporter.finish();

        let received: Vec<u8> = (0..2)
            .map(|_| {
                match client_end
                    .receiver()
                    .recv_timeout(Duration::from_secs(1))
                    .unwrap()
                    .message
                {
                    Message::Progress(event) => event.progress,
                    other => panic!("unexpected message {:?}", other),
                }
            })
            .collect();
        assert_eq!(received, vec![40, 100]);
    }

    #[test]
    fn test_closed_port_does_not_stop_local_delivery() {
        let (worker_end, client_end) = MessageChannel::new();
        drop(client_end);
        let mut seen = Vec::new();
        {
            let mut push = |value: u8| seen.push(value);
            let reporter = ProgressReporter::new(Some(&mut push as &mut dyn FnMut(u8)), Some(&worker_end));
            reporter.finish();
        }
        assert_eq!(seen, vec![100]);
    }
}
