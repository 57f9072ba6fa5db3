//! LAN endpoint discovery: which local address should the server bind?
//!
//! The server must be reachable from other machines on the LAN, so binding
//! `0.0.0.0` is not enough: the address is also shown to the user so they can
//! type it into a client.  Discovery walks the local interfaces and picks the
//! first non-loopback IPv4 address on an Ethernet or Wi-Fi adapter.
//!
//! # Which adapters count as "LAN"?
//!
//! Adapter names follow per-OS conventions:
//!
//! | Platform | Accepted names                                 |
//! |----------|------------------------------------------------|
//! | Linux    | `wl*` (Wi-Fi), `en*` (predictable Ethernet), `eth*` |
//! | Windows  | `Ethernet*`, anything containing `Wi-Fi` (any case) |
//! | other    | discovery unsupported (`UnsupportedPlatform`)  |
//!
//! Virtual adapters (Docker bridges, VPN tunnels, `lo`) are skipped by this
//! filter.  A deployment that needs a different address sets
//! `server.bind_address` in the config file, which bypasses discovery.
//!
//! Interface enumeration goes through the [`InterfaceSource`] trait so the
//! selection rules can be unit-tested without touching the host's adapters.

use std::net::{IpAddr, Ipv4Addr};

use lanchat_core::{Endpoint, SessionError};
use tracing::{debug, info};

/// Operating-system family, as far as adapter naming is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Windows,
    Other,
}

impl Platform {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Other
        }
    }
}

/// One local network adapter as seen by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub ipv4: Vec<Ipv4Addr>,
    pub is_loopback: bool,
}

/// Source of the host's network adapters.
#[cfg_attr(test, mockall::automock)]
pub trait InterfaceSource: Send + Sync {
    fn interfaces(&self) -> Vec<InterfaceInfo>;
}

impl<T: InterfaceSource + ?Sized> InterfaceSource for Box<T> {
    fn interfaces(&self) -> Vec<InterfaceInfo> {
        (**self).interfaces()
    }
}

/// Reads the real adapters through `netdev`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetdevInterfaces;

impl InterfaceSource for NetdevInterfaces {
    fn interfaces(&self) -> Vec<InterfaceInfo> {
        netdev::get_interfaces()
            .into_iter()
            .map(|iface| InterfaceInfo {
                is_loopback: iface.is_loopback(),
                ipv4: iface.ipv4.iter().map(|net| net.addr()).collect(),
                name: iface.name,
            })
            .collect()
    }
}

/// Returns `true` if an adapter called `name` is a LAN adapter on `platform`.
///
/// Windows names match case-insensitively.
pub fn is_lan_interface_name(platform: Platform, name: &str) -> bool {
    match platform {
        Platform::Linux => ["wl", "en", "eth"].iter().any(|p| name.starts_with(p)),
        Platform::Windows => {
            let name = name.to_ascii_lowercase();
            name.starts_with("ethernet") || name.contains("wi-fi")
        }
        Platform::Other => false,
    }
}

/// Picks the server's listening endpoint.
pub struct EndpointDiscovery<S> {
    source: S,
    platform: Platform,
}

impl<S: InterfaceSource> EndpointDiscovery<S> {
    pub fn with_source(source: S, platform: Platform) -> Self {
        Self { source, platform }
    }

    /// Returns `<first LAN IPv4 address>:<port>`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::UnsupportedPlatform`] on an OS without naming rules.
    /// - [`SessionError::NoLanInterface`] if no adapter qualifies.
    pub fn find_local_endpoint(&self, port: u16) -> Result<Endpoint, SessionError> {
        if self.platform == Platform::Other {
            return Err(SessionError::UnsupportedPlatform);
        }

        for iface in self.source.interfaces() {
            if iface.is_loopback || !is_lan_interface_name(self.platform, &iface.name) {
                debug!(interface = %iface.name, "skipping non-LAN interface");
                continue;
            }
            if let Some(addr) = iface.ipv4.iter().find(|a| !a.is_loopback()) {
                info!(interface = %iface.name, address = %addr, "selected LAN interface");
                return Ok(Endpoint::new(IpAddr::V4(*addr), port));
            }
        }
        Err(SessionError::NoLanInterface)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
