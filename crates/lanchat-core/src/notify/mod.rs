//! The one-way notification channel from the engine to a front-end.
//!
//! The engine never talks to a window, a widget, or a terminal.  Everything a
//! front-end needs to know arrives through a [`StatusSink`]:
//!
//! - [`StatusSink::status`]: a lifecycle transition or an error
//!   ([`StatusEvent`]), emitted on every connect/accept/disconnect/failure.
//! - [`StatusSink::listening_on`]: once per successful server bind.
//! - [`StatusSink::message_received`]: once per completed read, carrying
//!   exactly the bytes of that read.
//!
//! # Threading
//!
//! Sink methods are called from worker threads, possibly concurrently, so
//! implementations must be `Send + Sync` and must not block for long.  The
//! channel-sender implementation below simply enqueues a [`SessionEvent`]
//! for the front-end to drain on its own thread.

use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;

use crate::domain::Endpoint;
use crate::error::{ErrorKind, SessionError, SlotIndex};

pub mod mock;

/// How a front-end should present a [`StatusEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// A connection was established.
    Success,
    /// A normal lifecycle change (peer left, pool full, session closed).
    Info,
    /// Something failed, but the session keeps running.
    Transient,
    /// The session attempt failed and the session is inert until restarted.
    Fatal,
}

/// A status change reported by a session.
#[derive(Debug)]
pub enum StatusEvent {
    /// A TCP connection is open.  `slot` is set on the server side.
    Connected {
        peer: SocketAddr,
        slot: Option<SlotIndex>,
    },
    /// The remote side closed the connection.
    PeerDisconnected { slot: Option<SlotIndex> },
    /// The server pool is full; no further client is accepted.
    CapacityReached,
    /// The session was closed locally.
    Closed,
    /// An operation failed.
    Failed(SessionError),
}

impl StatusEvent {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Connected { .. } => Severity::Success,
            Self::PeerDisconnected { .. } | Self::CapacityReached | Self::Closed => Severity::Info,
            Self::Failed(err) => match err.kind() {
                ErrorKind::Setup => Severity::Fatal,
                ErrorKind::Accept | ErrorKind::Io | ErrorKind::Teardown | ErrorKind::Usage => {
                    Severity::Transient
                }
            },
        }
    }

    /// Returns the wrapped error for `Failed` events.
    pub fn error(&self) -> Option<&SessionError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SessionError> for StatusEvent {
    fn from(err: SessionError) -> Self {
        Self::Failed(err)
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected { peer, slot: None } => write!(f, "Connected to {peer}!"),
            Self::Connected { peer, slot: Some(slot) } => {
                write!(f, "Client #{slot} connected from {peer}.")
            }
            Self::PeerDisconnected { slot: None } => write!(f, "The server closed the connection."),
            Self::PeerDisconnected { slot: Some(slot) } => write!(f, "Client #{slot} disconnected."),
            Self::CapacityReached => write!(f, "No more clients can connect to the server."),
            Self::Closed => write!(f, "Connection closed."),
            Self::Failed(err) => write!(f, "{err}"),
        }
    }
}

/// The bytes delivered by one completed read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Server-side slot the bytes came from; `None` on the client.
    pub from: Option<SlotIndex>,
    pub bytes: Vec<u8>,
}

impl ReceivedMessage {
    /// The payload as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// Everything a sink can be told, as one value (for channel-based sinks).
#[derive(Debug)]
pub enum SessionEvent {
    Status(StatusEvent),
    ListeningOn(Endpoint),
    MessageReceived(ReceivedMessage),
}

/// Receiver of engine notifications.
#[cfg_attr(test, mockall::automock)]
pub trait StatusSink: Send + Sync {
    fn status(&self, event: StatusEvent);
    fn listening_on(&self, endpoint: Endpoint);
    fn message_received(&self, message: ReceivedMessage);
}

impl StatusSink for std::sync::mpsc::Sender<SessionEvent> {
    fn status(&self, event: StatusEvent) {
        let _ = self.send(SessionEvent::Status(event));
    }

    fn listening_on(&self, endpoint: Endpoint) {
        let _ = self.send(SessionEvent::ListeningOn(endpoint));
    }

    fn message_received(&self, message: ReceivedMessage) {
        let _ = self.send(SessionEvent::MessageReceived(message));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[test]
    fn test_connected_event_is_success() {
        let event = StatusEvent::Connected {
            peer: "192.168.0.4:50000".parse().unwrap(),
            slot: Some(0),
        };
        assert_eq!(event.severity(), Severity::Success);
        assert_eq!(event.to_string(), "Client #0 connected from 192.168.0.4:50000.");
    }

    #[test]
    fn test_setup_failure_is_fatal_and_io_failure_is_transient() {
        // Arrange
        let setup = StatusEvent::Failed(SessionError::NoLanInterface);
        let io = StatusEvent::Failed(SessionError::Read {
            slot: None,
            source: std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"),
        });

        // Act / Assert
        assert_eq!(setup.severity(), Severity::Fatal);
        assert_eq!(io.severity(), Severity::Transient);
        assert!(setup.error().is_some());
    }

    #[test]
    fn test_capacity_reached_text_is_stable() {
        assert_eq!(
            StatusEvent::CapacityReached.to_string(),
            "No more clients can connect to the server."
        );
    }

    #[test]
    fn test_received_message_text_replaces_invalid_utf8() {
        let msg = ReceivedMessage { from: None, bytes: vec![b'h', b'i', 0xFF] };
        assert_eq!(msg.text(), "hi\u{FFFD}");
    }

    #[test]
    fn test_std_sender_sink_forwards_every_kind_of_event() {
        // Arrange
        let (tx, rx) = std::sync::mpsc::channel();
        let endpoint = Endpoint::from("10.1.1.1:55555".parse::<SocketAddr>().unwrap());

        // Act
        tx.listening_on(endpoint);
        tx.status(StatusEvent::Closed);
        tx.message_received(ReceivedMessage { from: Some(2), bytes: b"x".to_vec() });

        // Assert
        assert!(matches!(rx.recv().unwrap(), SessionEvent::ListeningOn(e) if e == endpoint));
        assert!(matches!(rx.recv().unwrap(), SessionEvent::Status(StatusEvent::Closed)));
        assert!(matches!(
            rx.recv().unwrap(),
            SessionEvent::MessageReceived(m) if m.from == Some(2) && m.bytes == b"x"
        ));
    }

    #[test]
    fn test_mock_sink_receives_listening_endpoint() {
        // Arrange
        let endpoint = Endpoint::from("192.168.1.9:55555".parse::<SocketAddr>().unwrap());
        let mut sink = MockStatusSink::new();
        sink.expect_listening_on().with(eq(endpoint)).times(1).return_const(());

        // Act
        let sink: &dyn StatusSink = &sink;
        sink.listening_on(endpoint);
    }
}
