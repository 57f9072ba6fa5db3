//! Network infrastructure for the client application.
//!
//! - **`session`** – [`ClientSession`](session::ClientSession): connect,
//!   send, the receive loop and teardown of the single server connection.

pub mod session;
