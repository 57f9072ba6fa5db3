//! The `Endpoint` value type: an immutable (address, port) pair.
//!
//! The server binds exactly one endpoint per listening lifecycle; the client
//! targets one endpoint per connection attempt.  `Endpoint` is a thin newtype
//! over [`SocketAddr`] so that the rest of the engine can talk about "the
//! endpoint we listen on" without leaking the distinction between IPv4 and
//! IPv6 socket addresses into every signature.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// An immutable network endpoint (IP address plus TCP port).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    /// Creates an endpoint from an address and a port.
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(address, port))
    }

    /// The IP address part.
    pub fn address(&self) -> IpAddr {
        self.0.ip()
    }

    /// The TCP port part.
    pub fn port(&self) -> u16 {
        self.0.port()
    }

    /// Returns the endpoint as a socket address for `bind`/`connect` calls.
    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
