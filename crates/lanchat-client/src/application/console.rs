//! Console front-end logic for the client.

use lanchat_core::{SessionEvent, Severity};

/// One line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `/connect [host] [port]` – missing parts come from the config.
    Connect { host: Option<String>, port: Option<u16> },
    /// `/close`
    Close,
    /// `/quit`
    Quit,
    /// `/help`
    Help,
    /// Plain text: send it to the server.
    Send(String),
    Nothing,
    Unknown(String),
}

pub const HELP: &str = "commands: /connect [host] [port], /close, /quit; \
anything else is sent to the server";

pub fn parse_line(line: &str) -> ConsoleCommand {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return ConsoleCommand::Nothing;
    }
    if !line.starts_with('/') {
        return ConsoleCommand::Send(line.to_string());
    }

    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        ["/connect"] => ConsoleCommand::Connect { host: None, port: None },
        ["/connect", host] => ConsoleCommand::Connect {
            host: Some((*host).to_string()),
            port: None,
        },
        ["/connect", host, port] => match port.parse() {
            Ok(port) => ConsoleCommand::Connect {
                host: Some((*host).to_string()),
                port: Some(port),
            },
            Err(_) => ConsoleCommand::Unknown(line.to_string()),
        },
        ["/close"] => ConsoleCommand::Close,
        ["/quit"] | ["/exit"] => ConsoleCommand::Quit,
        ["/help", ..] => ConsoleCommand::Help,
        _ => ConsoleCommand::Unknown(line.to_string()),
    }
}

/// Renders an engine event as one console line.
pub fn render_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::MessageReceived(message) => format!("> {}", message.text()),
        SessionEvent::ListeningOn(endpoint) => format!("* listening on {endpoint}"),
        SessionEvent::Status(status) => match status.severity() {
            Severity::Success | Severity::Info => format!("* {status}"),
            Severity::Transient | Severity::Fatal => format!("! {status}"),
        },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use lanchat_core::{ReceivedMessage, StatusEvent};

    #[test]
    fn test_connect_with_host_and_port() {
        assert_eq!(
            parse_line("/connect 192.168.1.20 55555"),
            ConsoleCommand::Connect {
                host: Some("192.168.1.20".to_string()),
                port: Some(55555)
            }
        );
    }

    #[test]
    fn test_connect_without_arguments_uses_config() {
        assert_eq!(parse_line("/connect"), ConsoleCommand::Connect { host: None, port: None });
    }

    #[test]
    fn test_connect_with_bad_port_is_unknown() {
        assert!(matches!(parse_line("/connect host 99999"), ConsoleCommand::Unknown(_)));
    }

    #[test]
    fn test_plain_text_is_sent() {
        assert_eq!(parse_line("hi there"), ConsoleCommand::Send("hi there".to_string()));
        assert_eq!(parse_line(""), ConsoleCommand::Nothing);
    }

    #[test]
    fn test_render_event_formats_messages_and_status() {
        let msg = SessionEvent::MessageReceived(ReceivedMessage { from: None, bytes: b"yo".to_vec() });
        assert_eq!(render_event(&msg), "> yo");
        assert_eq!(
            render_event(&SessionEvent::Status(StatusEvent::Closed)),
            "* Connection closed."
        );
    }
}
