//! Recording sink for tests.
//!
//! # Why a recording sink?
//!
//! Session completions happen on worker threads at some unknown later time.
//! A test that calls `connect()` and immediately asserts on the result would
//! race the worker.  `RecordingSink` stores every notification in order and
//! lets the test *wait* (with a timeout) until the event it expects shows
//! up, instead of sleeping for a guessed duration.
//!
//! # Usage in tests
//!
//! ```ignore
//! let sink = Arc::new(RecordingSink::new());
//! let server = ServerSession::new(config, sink.clone());
//! server.start_listening()?;
//!
//! assert!(sink.wait_for(Duration::from_secs(5), |e| {
//!     matches!(e, SessionEvent::ListeningOn(_))
//! }));
//! ```

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use super::{ReceivedMessage, SessionEvent, StatusEvent, StatusSink};
use crate::domain::Endpoint;

/// A sink that records every event and supports blocking waits.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SessionEvent>>,
    changed: Condvar,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: SessionEvent) {
        self.events.lock().unwrap().push(event);
        self.changed.notify_all();
    }

    /// Blocks until at least `count` recorded events satisfy `pred`.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub fn wait_for_count<F>(&self, timeout: Duration, count: usize, pred: F) -> bool
    where
        F: Fn(&SessionEvent) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock().unwrap();
        loop {
            if events.iter().filter(|e| pred(e)).count() >= count {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            events = self.changed.wait_timeout(events, deadline - now).unwrap().0;
        }
    }

    /// Blocks until any recorded event satisfies `pred`.
    pub fn wait_for<F>(&self, timeout: Duration, pred: F) -> bool
    where
        F: Fn(&SessionEvent) -> bool,
    {
        self.wait_for_count(timeout, 1, pred)
    }

    /// Number of recorded events satisfying `pred`.
    pub fn count<F>(&self, pred: F) -> usize
    where
        F: Fn(&SessionEvent) -> bool,
    {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    /// All received messages, in arrival order.
    pub fn messages(&self) -> Vec<ReceivedMessage> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                SessionEvent::MessageReceived(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    /// Concatenation of all received payloads, in arrival order.
    pub fn received_bytes(&self) -> Vec<u8> {
        self.messages().into_iter().flat_map(|m| m.bytes).collect()
    }

    /// All status notifications rendered as text.
    pub fn status_texts(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Status(s) => Some(s.to_string()),
                _ => None,
            })
            .collect()
    }

    /// Every endpoint reported through `listening_on`.
    pub fn listening_endpoints(&self) -> Vec<Endpoint> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                SessionEvent::ListeningOn(endpoint) => Some(*endpoint),
                _ => None,
            })
            .collect()
    }

    /// Drops everything recorded so far.
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl StatusSink for RecordingSink {
    fn status(&self, event: StatusEvent) {
        self.push(SessionEvent::Status(event));
    }

    fn listening_on(&self, endpoint: Endpoint) {
        self.push(SessionEvent::ListeningOn(endpoint));
    }

    fn message_received(&self, message: ReceivedMessage) {
        self.push(SessionEvent::MessageReceived(message));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
