//! The asynchronous I/O engine shared by both applications.
//!
//! - [`event_loop`] – the worker pool that drives every asynchronous
//!   operation, plus the keep-alive token long-lived loops select on.
//! - [`connection`] – one TCP socket with its own open/closed state, an
//!   ordered write queue and a single-owner receive loop.

pub mod connection;
pub mod event_loop;

pub use connection::{Connection, IoContext, ReceiveEnd};
pub use event_loop::{EventLoopPool, KeepAlive, Spawner};
