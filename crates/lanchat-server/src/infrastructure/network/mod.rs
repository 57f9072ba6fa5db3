//! Network infrastructure for the server application.
//!
//! # Sub-modules
//!
//! - **`discovery`** – Picks the LAN address to listen on by walking the
//!   local network interfaces.
//!
//! - **`pool`** – The bounded, slot-recycling arena of client connections
//!   (admission control).
//!
//! - **`session`** – [`ServerSession`](session::ServerSession): the acceptor,
//!   the accept loop, per-client receive loops, unicast/broadcast send and
//!   teardown.

pub mod discovery;
pub mod pool;
pub mod session;
