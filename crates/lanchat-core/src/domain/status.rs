//! Session-level and connection-level lifecycle flags.
//!
//! Two distinct flags exist and must not be confused:
//!
//! - [`SessionStatus`] answers "may this session keep issuing new
//!   asynchronous operations?".  It is shared by every task of a session and
//!   is the gate checked before each receive is re-armed.
//! - [`ConnectionState`] answers "is this particular socket usable?".  Each
//!   `Connection` carries its own.
//!
//! Both are stored in atomics ([`StatusCell`], [`ConnectionStateCell`])
//! because completion handlers running on different worker threads read and
//! write them concurrently.
//!
//! ```text
//! SessionStatus:    NotStarted ──► Active ──► Stopped
//!                                    ▲           │
//!                                    └───────────┘  (only via a new listen/connect)
//!
//! ConnectionState:  Unconnected ──► Open ──► Closed
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Whether a session as a whole may keep issuing asynchronous operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// No `connect`/`listen` has succeeded yet.
    NotStarted,
    /// The session is running; receive loops may re-arm.
    Active,
    /// The session was closed; nothing re-arms until a new `connect`/`listen`.
    Stopped,
}

impl SessionStatus {
    fn as_u8(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Active => 1,
            Self::Stopped => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Active,
            2 => Self::Stopped,
            _ => Self::NotStarted,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Active => write!(f, "active"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Atomic holder for a [`SessionStatus`].
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(SessionStatus::NotStarted.as_u8()))
    }

    pub fn get(&self) -> SessionStatus {
        SessionStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.get() == SessionStatus::Active
    }

    /// Marks the session active.
    pub fn activate(&self) {
        self.0.store(SessionStatus::Active.as_u8(), Ordering::Release);
    }

    /// Marks the session stopped and returns the status it had before.
    pub fn stop(&self) -> SessionStatus {
        SessionStatus::from_u8(self.0.swap(SessionStatus::Stopped.as_u8(), Ordering::AcqRel))
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle of a single TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// A socket slot exists but no connection has been established on it.
    Unconnected,
    /// Connected; reads and writes are permitted.
    Open,
    /// Shut down locally or by the peer.
    Closed,
}

impl ConnectionState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Unconnected => 0,
            Self::Open => 1,
            Self::Closed => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Open,
            2 => Self::Closed,
            _ => Self::Unconnected,
        }
    }
}

/// Atomic holder for a [`ConnectionState`].
#[derive(Debug)]
pub struct ConnectionStateCell(AtomicU8);

impl ConnectionStateCell {
    pub fn new(initial: ConnectionState) -> Self {
        Self(AtomicU8::new(initial.as_u8()))
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.get() == ConnectionState::Open
    }

    /// Transitions `Open -> Closed`.
    ///
    /// Returns `true` for exactly one caller; every later call (or a call on
    /// a connection that never opened) returns `false`.
    pub fn close(&self) -> bool {
        self.0
            .compare_exchange(
                ConnectionState::Open.as_u8(),
                ConnectionState::Closed.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_cell_starts_not_started() {
        let cell = StatusCell::new();
        assert_eq!(cell.get(), SessionStatus::NotStarted);
        assert!(!cell.is_active());
    }

    #[test]
    fn test_status_cell_activate_then_stop_reports_previous() {
        // Arrange
        let cell = StatusCell::new();
        cell.activate();

        // Act
        let previous = cell.stop();

        // Assert
        assert_eq!(previous, SessionStatus::Active);
        assert_eq!(cell.get(), SessionStatus::Stopped);
    }

    #[test]
    fn test_status_cell_stop_twice_reports_stopped_second_time() {
        let cell = StatusCell::new();
        cell.activate();
        cell.stop();
        assert_eq!(cell.stop(), SessionStatus::Stopped);
    }

    #[test]
    fn test_connection_state_close_succeeds_only_once() {
        // Arrange
        let cell = ConnectionStateCell::new(ConnectionState::Open);

        // Act
        let first = cell.close();
        let second = cell.close();

        // Assert
        assert!(first, "first close must win the transition");
        assert!(!second, "second close must be a no-op");
        assert_eq!(cell.get(), ConnectionState::Closed);
    }

    #[test]
    fn test_connection_state_close_on_unconnected_is_noop() {
        let cell = ConnectionStateCell::new(ConnectionState::Unconnected);
        assert!(!cell.close());
        assert_eq!(cell.get(), ConnectionState::Unconnected);
    }

    #[test]
    fn test_session_status_display_is_lowercase() {
        assert_eq!(SessionStatus::NotStarted.to_string(), "not started");
        assert_eq!(SessionStatus::Active.to_string(), "active");
        assert_eq!(SessionStatus::Stopped.to_string(), "stopped");
    }
}
