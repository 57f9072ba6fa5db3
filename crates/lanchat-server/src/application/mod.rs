//! Application layer for the server.
//!
//! # Sub-modules
//!
//! - **`console`** – Parses operator input into commands and renders session
//!   events as text.  No sockets, no stdin: the binary does the I/O.

pub mod console;
