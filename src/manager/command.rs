//! The Logger Manager's control surface (spec.md §4.4) realized as a
//! serializable `Command` enum, shared by the websocket command listener,
//! the interactive REPL, and `LoggerManagerWriter`'s fire-and-forget
//! submissions (spec.md §4.7, §9 "make LoggerManagerWriter's submission
//! fire-and-forget").

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// One command from spec.md §4.4's control surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    LoadConfiguration { source: String },
    ReloadConfiguration,
    DeleteConfiguration,
    GetModes,
    GetActiveMode,
    SetActiveMode { mode: String },
    GetLoggers,
    GetLoggerConfigs { logger: String },
    GetActiveLoggerConfig { logger: String },
    SetActiveLoggerConfig { logger: String, config: String },
    GetStatus,
    Quit,
    /// A no-op diagnostic command, present only because spec.md §4.7's
    /// example whitelist (`"set_active_mode ,sleep "`) names it alongside
    /// `set_active_mode`; it lets a geofence test fixture exercise the
    /// whitelist without driving real reconfiguration.
    Sleep { seconds: f64 },
}

impl Command {
    /// Parse the textual, whitespace-separated command records emitted by
    /// `GeofenceTransform` (spec.md §4.7, scenario 6: `"set_active_mode
    /// eez_mode"`). Returns `None` for anything that isn't a recognized
    /// command name — callers check the whitelist separately, before ever
    /// reaching this parse.
    pub fn parse_text(text: &str) -> Option<Command> {
        let mut parts = text.trim().split_whitespace();
        let name = parts.next()?;
        match name {
            "load_configuration" => Some(Command::LoadConfiguration {
                source: parts.next()?.to_string(),
            }),
            "reload_configuration" => Some(Command::ReloadConfiguration),
            "delete_configuration" => Some(Command::DeleteConfiguration),
            "set_active_mode" => Some(Command::SetActiveMode {
                mode: parts.next()?.to_string(),
            }),
            "set_active_logger_config" => Some(Command::SetActiveLoggerConfig {
                logger: parts.next()?.to_string(),
                config: parts.next()?.to_string(),
            }),
            "quit" => Some(Command::Quit),
            "sleep" => Some(Command::Sleep {
                seconds: parts.next()?.parse().ok()?,
            }),
            _ => None,
        }
    }
}

/// Immediate acknowledgement of a command's acceptance into the intent
/// queue — not a result of reconciliation having run (spec.md §4.4
/// "Command handlers are non-blocking with respect to reconciliation").
/// Read-only `Get*` commands populate `data` with their answer; mutating
/// commands leave it `None` and only report acceptance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandAck {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CommandAck {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            error: None,
            data: None,
        }
    }

    pub fn with_data(data: serde_json::Value) -> Self {
        Self {
            accepted: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            accepted: false,
            error: Some(error.into()),
            data: None,
        }
    }
}

/// Submit a single command to a manager listening at `addr` and wait only
/// for its acceptance ack, not for the reconciliation the command may
/// trigger.
pub async fn send_command(addr: SocketAddr, command: &Command) -> anyhow::Result<CommandAck> {
    let (stream, _response) =
        tokio_tungstenite::connect_async(format!("ws://{addr}")).await?;
    let (mut sink, mut stream) = stream.split();
    let text = serde_json::to_string(command)?;
    sink.send(WsMessage::Text(text)).await?;
    let reply = stream
        .next()
        .await
        .ok_or_else(|| anyhow::anyhow!("manager closed connection without an ack"))??;
    let ack: CommandAck = serde_json::from_str(&reply.into_text()?)?;
    Ok(ack)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_set_active_mode() {
        assert_eq!(
            Command::parse_text("set_active_mode eez_mode"),
            Some(Command::SetActiveMode {
                mode: "eez_mode".to_string()
            })
        );
    }

    #[test]
    fn unknown_command_name_parses_to_none() {
        assert_eq!(Command::parse_text("rm -rf /"), None);
    }

    #[test]
    fn sleep_command_parses_seconds() {
        assert_eq!(
            Command::parse_text("sleep 5"),
            Some(Command::Sleep { seconds: 5.0 })
        );
    }
}
