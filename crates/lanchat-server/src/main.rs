//! LanChat server: entry point.
//!
//! Loads the configuration, applies command-line overrides, starts listening
//! and then runs a line-oriented console on stdin/stdout.
//!
//! # Usage
//!
//! ```text
//! lanchat-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>        Config file [default: platform config dir]
//!   --port <PORT>          TCP port to listen on
//!   --max-clients <N>      Maximum simultaneously connected clients
//!   --group-chat           Relay every message to all other clients
//!   --bind <ADDR>          Bind this address instead of discovering one
//! ```
//!
//! Every option also reads an environment variable (`LANCHAT_PORT`,
//! `LANCHAT_MAX_CLIENTS`, ...); command-line values win.
//!
//! # Threads
//!
//! ```text
//! main thread      stdin ──► parse_line ──► ServerSession (sync API)
//! printer thread   SessionEvent channel ──► render_event ──► stdout
//! io workers       owned by the session's EventLoopPool
//! ```
//!
//! The session's public methods block while tearing down, so `main` is a
//! plain function rather than a Tokio entry point.

use std::io::BufRead;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lanchat_core::SessionEvent;
use lanchat_server::application::console::{parse_line, render_event, ConsoleCommand, HELP};
use lanchat_server::infrastructure::storage::config::{load_config, load_config_from};
use lanchat_server::{ServerOptions, ServerSession};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// LanChat server.
///
/// Listens on the LAN interface and relays chat messages between up to
/// `max_clients` clients.
#[derive(Debug, Parser)]
#[command(name = "lanchat-server", about = "LAN chat server", version)]
struct Cli {
    /// Path of the TOML config file.
    #[arg(long, env = "LANCHAT_SERVER_CONFIG")]
    config: Option<PathBuf>,

    /// TCP port to listen on.
    #[arg(long, env = "LANCHAT_PORT")]
    port: Option<u16>,

    /// Maximum number of simultaneously connected clients.
    #[arg(long, env = "LANCHAT_MAX_CLIENTS")]
    max_clients: Option<usize>,

    /// Relay each received message to every other client.
    #[arg(long, env = "LANCHAT_GROUP_CHAT")]
    group_chat: bool,

    /// Address to bind; skips LAN interface discovery.
    #[arg(long, env = "LANCHAT_BIND")]
    bind: Option<IpAddr>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => load_config().context("loading config")?,
    };
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(max_clients) = cli.max_clients {
        config.server.max_clients = max_clients;
    }
    if cli.group_chat {
        config.server.group_chat = true;
    }
    if let Some(bind) = cli.bind {
        config.server.bind_address = Some(bind);
    }

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("LanChat server starting");

    let (events_tx, events_rx) = mpsc::channel::<SessionEvent>();
    let printer = std::thread::Builder::new()
        .name("console-printer".to_string())
        .spawn(move || {
            for event in events_rx {
                println!("{}", render_event(&event));
            }
        })
        .context("spawning console printer")?;

    let server = ServerSession::new(ServerOptions::from_config(&config), Arc::new(events_tx));
    // A failed first listen is already on screen; the operator can retry.
    let _ = server.start_listening();
    println!("{HELP}");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        match parse_line(&line) {
            ConsoleCommand::Listen => {
                let _ = server.start_listening();
            }
            ConsoleCommand::GroupChat(enabled) => {
                server.set_group_chat(enabled);
                println!("* group chat {}", if enabled { "on" } else { "off" });
            }
            ConsoleCommand::Close => server.close_connection(),
            ConsoleCommand::Clients => println!(
                "* {} of {} clients connected",
                server.client_count(),
                server.max_clients()
            ),
            ConsoleCommand::Broadcast(text) => {
                let _ = server.send(text.as_bytes(), None);
            }
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Unknown(input) => warn!("unknown command: {input}"),
            ConsoleCommand::Nothing => {}
            ConsoleCommand::Quit => break,
        }
    }

    server.finish();
    // Dropping the session drops the last sender and ends the printer.
    drop(server);
    let _ = printer.join();
    info!("LanChat server stopped");
    Ok(())
}
