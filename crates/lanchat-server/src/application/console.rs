//! Console front-end logic: turning typed lines into session commands and
//! session events into printable lines.
//!
//! This is the headless stand-in for a chat window.  It contains no I/O, so
//! the binary's stdin/stdout loop stays a thin shell around these two
//! functions.

use lanchat_core::{SessionEvent, Severity};

/// One line typed by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `/listen` – bind (or re-open) the acceptor.
    Listen,
    /// `/group on` / `/group off` – toggle group-chat relay.
    GroupChat(bool),
    /// `/close` – close every client and the acceptor.
    Close,
    /// `/clients` – print the number of open clients.
    Clients,
    /// `/quit` – tear everything down and exit.
    Quit,
    /// `/help`
    Help,
    /// Anything that is not a command: broadcast it to every client.
    Broadcast(String),
    /// Empty input.
    Nothing,
    /// A `/command` that is not recognised, or has bad arguments.
    Unknown(String),
}

pub const HELP: &str = "commands: /listen, /group on|off, /close, /clients, /quit; \
anything else is sent to every client";

/// Parses one input line.
pub fn parse_line(line: &str) -> ConsoleCommand {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return ConsoleCommand::Nothing;
    }
    if !line.starts_with('/') {
        return ConsoleCommand::Broadcast(line.to_string());
    }

    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default();
    let argument = words.next();
    match (command, argument) {
        ("/listen", None) => ConsoleCommand::Listen,
        ("/group", Some("on")) => ConsoleCommand::GroupChat(true),
        ("/group", Some("off")) => ConsoleCommand::GroupChat(false),
        ("/close", None) => ConsoleCommand::Close,
        ("/clients", None) => ConsoleCommand::Clients,
        ("/quit", None) | ("/exit", None) => ConsoleCommand::Quit,
        ("/help", _) => ConsoleCommand::Help,
        _ => ConsoleCommand::Unknown(line.to_string()),
    }
}

/// Renders an engine event as one console line.
pub fn render_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::ListeningOn(endpoint) => format!("* listening on {endpoint}"),
        SessionEvent::MessageReceived(message) => match message.from {
            Some(slot) => format!("[client #{slot}] {}", message.text()),
            None => format!("[server] {}", message.text()),
        },
        SessionEvent::Status(status) => {
            let marker = match status.severity() {
                Severity::Success => "+",
                Severity::Info => "*",
                Severity::Transient => "!",
                Severity::Fatal => "!!",
            };
            format!("{marker} {status}")
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
