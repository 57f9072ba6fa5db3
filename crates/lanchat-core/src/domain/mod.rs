//! Plain value types of the connection engine.
//!
//! Nothing in here touches a socket or a runtime; these types can be
//! constructed and tested on any machine without network access.

pub mod endpoint;
pub mod status;

pub use endpoint::Endpoint;
pub use status::{ConnectionState, ConnectionStateCell, SessionStatus, StatusCell};
