//! Application layer for the client.
//!
//! - **`console`** – Parses typed lines into commands and renders session
//!   events as text.

pub mod console;
