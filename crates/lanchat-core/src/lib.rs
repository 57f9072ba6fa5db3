//! # lanchat-core
//!
//! Shared library for the LAN chat client and server: the asynchronous
//! networking engine, the notification channel to the front-end, and the
//! small domain types both sides agree on.
//!
//! # Architecture overview (for beginners)
//!
//! LAN chat is a point-to-multipoint TCP text chat.  A server listens on its
//! LAN address and admits a bounded number of clients; each client connects
//! to it and exchanges raw bytes.  There is no framing: one completed read
//! is one delivered message, so a long message may arrive in pieces.
//!
//! This crate is the common foundation.  It defines:
//!
//! - **`domain`** – value types with no I/O: the [`Endpoint`] a server is
//!   reachable at, and the atomic lifecycle flags ([`StatusCell`],
//!   [`ConnectionStateCell`]).
//!
//! - **`engine`** – the [`EventLoopPool`] (a fixed set of worker threads
//!   running every connect/accept/read/write) and [`Connection`], which owns
//!   one socket together with its read loop and write queue.
//!
//! - **`notify`** – the [`StatusSink`] trait through which a session reports
//!   status changes, its listening endpoint, and received bytes.  The engine
//!   never touches a UI directly.
//!
//! - **`error`** – [`SessionError`], the one error type both sessions return
//!   and report.
//!
//! - **`config`** – [`EngineConfig`], the `[engine]` table shared by both
//!   applications' TOML files.

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod notify;

// Re-export the most-used types at the crate root so callers can write
// `lanchat_core::Endpoint` instead of `lanchat_core::domain::endpoint::Endpoint`.
pub use config::EngineConfig;
pub use domain::{ConnectionState, ConnectionStateCell, Endpoint, SessionStatus, StatusCell};
pub use engine::{Connection, EventLoopPool, IoContext, KeepAlive, ReceiveEnd, Spawner};
pub use error::{ErrorKind, SessionError, SlotIndex};
pub use notify::{ReceivedMessage, SessionEvent, Severity, StatusEvent, StatusSink};
