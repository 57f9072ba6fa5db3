//! LanChat client: entry point.
//!
//! Loads the configuration, applies command-line overrides, optionally
//! connects right away, then runs a line-oriented console on stdin/stdout.
//!
//! ```text
//! lanchat-client [--config <PATH>] [--host <HOST>] [--port <PORT>]
//! ```
//!
//! With `--host` (or `LANCHAT_HOST`) the client connects at start-up;
//! otherwise type `/connect [host] [port]`.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lanchat_client::application::console::{parse_line, render_event, ConsoleCommand, HELP};
use lanchat_client::infrastructure::storage::config::{load_config, load_config_from};
use lanchat_client::{ClientOptions, ClientSession};
use lanchat_core::SessionEvent;

/// LanChat client.
#[derive(Debug, Parser)]
#[command(name = "lanchat-client", about = "LAN chat client", version)]
struct Cli {
    /// Path of the TOML config file.
    #[arg(long, env = "LANCHAT_CLIENT_CONFIG")]
    config: Option<PathBuf>,

    /// Server host name or IP; connects immediately when given.
    #[arg(long, env = "LANCHAT_HOST")]
    host: Option<String>,

    /// Server port.
    #[arg(long, env = "LANCHAT_PORT")]
    port: Option<u16>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => load_config().context("loading config")?,
    };
    if let Some(port) = cli.port {
        config.client.server_port = port;
    }

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.client.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("LanChat client starting");

    let (events_tx, events_rx) = mpsc::channel::<SessionEvent>();
    let printer = std::thread::Builder::new()
        .name("console-printer".to_string())
        .spawn(move || {
            for event in events_rx {
                println!("{}", render_event(&event));
            }
        })
        .context("spawning console printer")?;

    let client = ClientSession::new(ClientOptions::from_config(&config), Arc::new(events_tx));
    if let Some(host) = &cli.host {
        let _ = client.connect(host, config.client.server_port);
    }
    println!("{HELP}");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        match parse_line(&line) {
            ConsoleCommand::Connect { host, port } => {
                let host = host.unwrap_or_else(|| config.client.server_address.clone());
                let port = port.unwrap_or(config.client.server_port);
                // Failures are reported through the event printer.
                let _ = client.connect(&host, port);
            }
            ConsoleCommand::Close => client.close_connection(),
            ConsoleCommand::Send(text) => {
                let _ = client.send(text.as_bytes());
            }
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Unknown(input) => warn!("unknown command: {input}"),
            ConsoleCommand::Nothing => {}
            ConsoleCommand::Quit => break,
        }
    }

    client.finish();
    drop(client);
    let _ = printer.join();
    info!("LanChat client stopped");
    Ok(())
}
