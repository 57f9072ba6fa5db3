//! Operational parameters of the engine.
//!
//! The defaults reproduce the historical fixed constants (two worker
//! threads, 4 KiB receive buffer).  Both applications embed this struct as
//! the `[engine]` table of their TOML config file.

use serde::{Deserialize, Serialize};

/// Default number of worker threads driving the I/O dispatcher.
pub const DEFAULT_WORKER_THREADS: usize = 2;
/// Default per-connection receive buffer capacity in bytes.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 4096;
/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 55555;
/// Default number of concurrently open server connections.
pub const DEFAULT_MAX_CLIENTS: usize = 5;

/// Engine tuning shared by the client and the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of worker threads in the event-loop pool (minimum 1).
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Capacity of each connection's receive buffer (minimum 1).
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,
}

fn default_worker_threads() -> usize {
    DEFAULT_WORKER_THREADS
}
fn default_recv_buffer_size() -> usize {
    DEFAULT_RECV_BUFFER_SIZE
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            recv_buffer_size: default_recv_buffer_size(),
        }
    }
}

impl EngineConfig {
    /// Worker count with zero clamped to one.
    pub fn effective_worker_threads(&self) -> usize {
        self.worker_threads.max(1)
    }

    /// Buffer size with zero clamped to one.
    pub fn effective_recv_buffer_size(&self) -> usize {
        self.recv_buffer_size.max(1)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
