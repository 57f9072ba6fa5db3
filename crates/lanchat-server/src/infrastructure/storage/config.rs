//! TOML-based configuration for the server application.
//!
//! The file lives in the platform config directory:
//! - Windows:  `%APPDATA%\LanChat\server\config.toml`
//! - Linux:    `~/.config/lanchat/server/config.toml`
//! - macOS:    `~/Library/Application Support/LanChat/server/config.toml`
//!
//! A missing file is not an error: the server runs on defaults, which
//! reproduce the classic behaviour (port 55555, five clients, relay off).
//!
//! ```toml
//! [server]
//! port = 55555
//! max_clients = 5
//! group_chat = true
//! # bind_address = "192.168.1.20"   # skip interface discovery
//!
//! [engine]
//! worker_threads = 2
//! recv_buffer_size = 4096
//! ```
//!
//! Every field carries `#[serde(default = ...)]`, so a file that sets only
//! one value still loads.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use lanchat_core::config::{DEFAULT_MAX_CLIENTS, DEFAULT_SERVER_PORT};
use lanchat_core::EngineConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Listening and admission settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// TCP port to listen on.  `0` lets the OS pick one.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum number of simultaneously open client connections.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Relay each received message to every other open client.
    #[serde(default)]
    pub group_chat: bool,
    /// Start reading from a client as soon as it is accepted.
    #[serde(default = "default_true")]
    pub auto_recv: bool,
    /// Fixed address to bind; when absent the LAN interface is discovered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<IpAddr>,
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_port() -> u16 {
    DEFAULT_SERVER_PORT
}
fn default_max_clients() -> usize {
    DEFAULT_MAX_CLIENTS
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            max_clients: default_max_clients(),
            group_chat: false,
            auto_recv: default_true(),
            bind_address: None,
            log_level: default_log_level(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default path of the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform base
/// directory cannot be determined from the environment.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from its default location.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads the config at `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("LanChat").join("server"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("lanchat").join("server"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("LanChat")
                .join("server")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("lanchat-server-test-{}-{name}", std::process::id()))
            .join("config.toml")
    }

    #[test]
    fn test_app_config_default_matches_classic_constants() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.server.port, 55555);
        assert_eq!(cfg.server.max_clients, 5);
        assert!(!cfg.server.group_chat);
        assert!(cfg.server.bind_address.is_none());
        assert_eq!(cfg.engine.worker_threads, 2);
        assert_eq!(cfg.engine.recv_buffer_size, 4096);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        // Arrange
        let text = "[server]\nmax_clients = 2\nbind_address = \"127.0.0.1\"\n";

        // Act
        let cfg: AppConfig = toml::from_str(text).expect("deserialize");

        // Assert
        assert_eq!(cfg.server.max_clients, 2);
        assert_eq!(cfg.server.bind_address, Some("127.0.0.1".parse().unwrap()));
        assert_eq!(cfg.server.port, 55555);
        assert_eq!(cfg.server.log_level, "info");
        assert_eq!(cfg.engine, EngineConfig::default());
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let path = scratch_path("missing");
        let cfg = tokio_test::assert_ok!(load_config_from(&path));
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_saved_config_loads_back() {
        // Arrange
        let path = scratch_path("saved");
        let mut cfg = AppConfig::default();
        cfg.server.group_chat = true;
        cfg.engine.worker_threads = 4;

        // Act
        save_config_to(&path, &cfg).expect("save");
        let restored = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(restored, cfg);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let path = scratch_path("malformed");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[server\nport = ").unwrap();
        assert!(matches!(load_config_from(&path), Err(ConfigError::Parse(_))));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
