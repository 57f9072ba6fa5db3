//! Typed errors for every failure the engine can surface.
//!
//! Errors are grouped into the four categories the sessions treat
//! differently (see [`ErrorKind`]):
//!
//! | Kind       | Examples                              | Effect                                  |
//! |------------|---------------------------------------|-----------------------------------------|
//! | `Setup`    | no LAN interface, bind, resolve, connect | session attempt aborted, stays inert |
//! | `Accept`   | a failed `accept()`                   | reported, accept loop keeps going       |
//! | `Io`       | read/write failure on one connection  | only that connection is affected        |
//! | `Teardown` | shutdown/close failure                | reported, teardown continues            |
//!
//! `Usage` covers calls made in the wrong state (sending before connecting,
//! an unknown slot index).  Front-ends only ever see the `Display` text; the
//! enum stays internal to the Rust API.

use std::net::SocketAddr;

use thiserror::Error;

/// Index of a connection slot in the server's pool.
pub type SlotIndex = usize;

/// Error type shared by the client and server sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No Ethernet/Wi-Fi interface with a non-loopback IPv4 address was found.
    #[error("no LAN interface with an IPv4 address was found")]
    NoLanInterface,

    /// Interface discovery is not implemented for this operating system.
    #[error("LAN interface discovery is not supported on this platform")]
    UnsupportedPlatform,

    /// The acceptor could not be bound, typically because the port is in use.
    #[error("could not listen on {addr} (is the port used by another instance?): {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A host name could not be turned into an address.
    #[error("could not resolve '{host}': {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// The TCP connect to the server failed.
    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// `accept()` returned an error.
    #[error("accepting a client failed: {0}")]
    Accept(#[source] std::io::Error),

    /// A read on an open connection failed.
    #[error("receive error{}: {source}", slot_suffix(.slot))]
    Read {
        slot: Option<SlotIndex>,
        #[source]
        source: std::io::Error,
    },

    /// A write on an open connection failed.
    #[error("an error occurred while transmitting data{}: {source}", slot_suffix(.slot))]
    Write {
        slot: Option<SlotIndex>,
        #[source]
        source: std::io::Error,
    },

    /// Shutting a socket down failed.
    #[error("error on socket shutdown/close{}: {source}", slot_suffix(.slot))]
    Shutdown {
        slot: Option<SlotIndex>,
        #[source]
        source: std::io::Error,
    },

    /// An operation needs an open connection and there is none.
    #[error("not connected")]
    NotConnected,

    /// `connect` was called while a connection attempt or connection exists.
    #[error("already connected; close the current connection first")]
    AlreadyConnected,

    /// The slot index does not exist in the pool.
    #[error("no connection slot with index {0}")]
    InvalidSlot(SlotIndex),

    /// The worker runtime could not be created.
    #[error("failed to start worker threads: {0}")]
    Runtime(#[source] std::io::Error),

    /// A completion handler panicked on a worker thread.
    #[error("worker fault: {0}")]
    WorkerFault(String),
}

fn slot_suffix(slot: &Option<SlotIndex>) -> String {
    match slot {
        Some(index) => format!(" on client #{index}"),
        None => String::new(),
    }
}

/// Failure category, used to decide how loudly and how often to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Setup,
    Accept,
    Io,
    Teardown,
    Usage,
}

impl SessionError {
    /// Returns the category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoLanInterface
            | Self::UnsupportedPlatform
            | Self::Bind { .. }
            | Self::Resolve { .. }
            | Self::Connect { .. }
            | Self::Runtime(_) => ErrorKind::Setup,
            Self::Accept(_) => ErrorKind::Accept,
            Self::Read { .. } | Self::Write { .. } | Self::WorkerFault(_) => ErrorKind::Io,
            Self::Shutdown { .. } => ErrorKind::Teardown,
            Self::NotConnected | Self::AlreadyConnected | Self::InvalidSlot(_) => ErrorKind::Usage,
        }
    }

    /// A copy with the same variant and text.
    ///
    /// Sessions both report an error through the sink and return it to the
    /// caller; `std::io::Error` is not `Clone`, so wrapped OS errors are
    /// rebuilt from their kind and message.
    pub fn duplicate(&self) -> Self {
        fn copy(e: &std::io::Error) -> std::io::Error {
            std::io::Error::new(e.kind(), e.to_string())
        }
        match self {
            Self::NoLanInterface => Self::NoLanInterface,
            Self::UnsupportedPlatform => Self::UnsupportedPlatform,
            Self::Bind { addr, source } => Self::Bind { addr: *addr, source: copy(source) },
            Self::Resolve { host, source } => Self::Resolve {
                host: host.clone(),
                source: copy(source),
            },
            Self::Connect { addr, source } => Self::Connect { addr: *addr, source: copy(source) },
            Self::Accept(source) => Self::Accept(copy(source)),
            Self::Read { slot, source } => Self::Read { slot: *slot, source: copy(source) },
            Self::Write { slot, source } => Self::Write { slot: *slot, source: copy(source) },
            Self::Shutdown { slot, source } => Self::Shutdown { slot: *slot, source: copy(source) },
            Self::NotConnected => Self::NotConnected,
            Self::AlreadyConnected => Self::AlreadyConnected,
            Self::InvalidSlot(slot) => Self::InvalidSlot(*slot),
            Self::Runtime(source) => Self::Runtime(copy(source)),
            Self::WorkerFault(reason) => Self::WorkerFault(reason.clone()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
