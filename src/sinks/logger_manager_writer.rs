//! `LoggerManagerWriter`: the paired Writer of `GeofenceTransform` (spec.md
//! §4.7). Receives textual command records, validates each against a
//! whitelist of allowed prefixes, and submits accepted ones to the Logger
//! Manager's command API — fire-and-forget, per spec.md §9 "break the
//! cycle by making LoggerManagerWriter's submission fire-and-forget".

use async_trait::async_trait;
use rvdas_core::error::CommandRejectedSnafu;
use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::WriterDescription;
use rvdas_core::stage::{StageContext, Writer, WriterConfig};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::net::SocketAddr;

use crate::manager::command::{send_command, Command};

/// `{host, port, whitelist}` — `whitelist` is a list of allowed command
/// prefixes, e.g. `["set_active_mode ", "sleep "]` (spec.md §4.7, §8
/// scenario 6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggerManagerWriterConfig {
    pub host: String,
    pub port: u16,
    pub whitelist: Vec<String>,
}

inventory::submit! {
    WriterDescription::new::<LoggerManagerWriterConfig>("LoggerManagerWriter")
}

#[async_trait]
impl WriterConfig for LoggerManagerWriterConfig {
    async fn build(&self, cx: StageContext) -> anyhow::Result<Box<dyn Writer>> {
        let addr: SocketAddr = format!("{}:{}", self.host, self.port).parse()?;
        tracing::debug!(stage = %cx.name, %addr, "configured logger manager writer");
        Ok(Box::new(LoggerManagerWriterImpl {
            addr,
            whitelist: self.whitelist.clone(),
        }))
    }

    fn accepts(&self) -> Option<RecordKind> {
        Some(RecordKind::Text)
    }
}

struct LoggerManagerWriterImpl {
    addr: SocketAddr,
    whitelist: Vec<String>,
}

impl LoggerManagerWriterImpl {
    fn allowed(&self, text: &str) -> bool {
        self.whitelist.iter().any(|prefix| text.starts_with(prefix.as_str()))
    }
}

#[async_trait]
impl Writer for LoggerManagerWriterImpl {
    async fn write(&mut self, record: Record) -> anyhow::Result<()> {
        let Some(text) = record.as_text() else {
            anyhow::bail!("LoggerManagerWriter requires a text command record");
        };
        let text = text.trim();
        if !self.allowed(text) {
            return Err(CommandRejectedSnafu {
                reason: format!("command `{text}` does not match any whitelisted prefix"),
            }
            .build()
            .into());
        }
        let Some(command) = Command::parse_text(text) else {
            return Err(CommandRejectedSnafu {
                reason: format!("unrecognized command `{text}`"),
            }
            .build()
            .into());
        };

        // Fire-and-forget: spawn the submission so a slow/unavailable
        // manager never paces this Listener's pipeline.
        let addr = self.addr;
        tokio::spawn(async move {
            if let Err(e) = send_command(addr, &command).await {
                tracing::warn!(%addr, error = %e, "logger manager command submission failed");
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer() -> LoggerManagerWriterImpl {
        LoggerManagerWriterImpl {
            addr: "127.0.0.1:8080".parse().unwrap(),
            whitelist: vec!["set_active_mode ".to_string(), "sleep ".to_string()],
        }
    }

    #[test]
    fn whitelisted_prefix_allowed() {
        let w = writer();
        assert!(w.allowed("set_active_mode eez_mode"));
        assert!(w.allowed("sleep 5"));
    }

    #[test]
    fn non_whitelisted_prefix_rejected() {
        let w = writer();
        assert!(!w.allowed("delete_configuration"));
    }
}
