//! `EmailWriter`: batches records and flushes them as a single rate-limited
//! email (spec.md §4.1 "email (rate-limited batch)"). Records accumulate
//! until either `max_records` is reached or `min_interval` has elapsed
//! since the last send; `write` never blocks on the SMTP round trip itself
//! beyond that pacing.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::WriterDescription;
use rvdas_core::stage::{StageContext, Writer, WriterConfig};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

fn default_smtp_server() -> String {
    "localhost".to_string()
}
fn default_subject() -> String {
    "rvdas logger alert".to_string()
}
fn default_max_records() -> usize {
    50
}
fn default_min_interval() -> f64 {
    60.0
}

/// `{to, from, smtp_server?, smtp_port?, username?, password?, subject?,
/// max_records?, min_interval?}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmailWriterConfig {
    pub to: Vec<String>,
    pub from: String,
    #[serde(default = "default_smtp_server")]
    pub smtp_server: String,
    #[serde(default)]
    pub smtp_port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    #[serde(default = "default_min_interval")]
    pub min_interval: f64,
}

inventory::submit! {
    WriterDescription::new::<EmailWriterConfig>("EmailWriter")
}

#[async_trait]
impl WriterConfig for EmailWriterConfig {
    async fn build(&self, cx: StageContext) -> anyhow::Result<Box<dyn Writer>> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.smtp_server);
        if let Some(port) = self.smtp_port {
            builder = builder.port(port);
        }
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        let transport = builder.build();
        tracing::debug!(stage = %cx.name, server = %self.smtp_server, "configured email writer");
        Ok(Box::new(EmailWriterImpl {
            config: self.clone(),
            transport,
            buffer: Vec::new(),
            window_start: None,
        }))
    }

    fn accepts(&self) -> Option<RecordKind> {
        None
    }

    fn flush_on_stop(&self) -> bool {
        true
    }
}

struct EmailWriterImpl {
    config: EmailWriterConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
    buffer: Vec<String>,
    window_start: Option<Instant>,
}

impl EmailWriterImpl {
    fn due(&self) -> bool {
        if self.buffer.len() >= self.config.max_records {
            return true;
        }
        match self.window_start {
            None => false,
            Some(t) => t.elapsed() >= Duration::from_secs_f64(self.config.min_interval.max(0.0)),
        }
    }

    async fn send_batch(&mut self) -> anyhow::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let body = self.buffer.join("\n");
        self.buffer.clear();
        self.window_start = None;

        let mut message = Message::builder()
            .from(self.config.from.parse()?)
            .subject(self.config.subject.clone());
        for to in &self.config.to {
            message = message.to(to.parse()?);
        }
        let message = message.body(body)?;
        self.transport.send(message).await?;
        Ok(())
    }
}

#[async_trait]
impl Writer for EmailWriterImpl {
    async fn write(&mut self, record: Record) -> anyhow::Result<()> {
        let Some(text) = record.as_text() else {
            anyhow::bail!("EmailWriter cannot render a structured record without a formatter");
        };
        if self.buffer.is_empty() {
            self.window_start = Some(Instant::now());
        }
        self.buffer.push(text.into_owned());
        if self.due() {
            self.send_batch().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> anyhow::Result<()> {
        self.send_batch().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impl_with(max_records: usize, min_interval: f64) -> EmailWriterImpl {
        let config = EmailWriterConfig {
            to: vec!["ops@example.com".into()],
            from: "rvdas@example.com".into(),
            smtp_server: "localhost".into(),
            smtp_port: None,
            username: None,
            password: None,
            subject: "alert".into(),
            max_records,
            min_interval,
        };
        EmailWriterImpl {
            transport: AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_server)
                .build(),
            config,
            buffer: Vec::new(),
            window_start: None,
        }
    }

    #[test]
    fn due_once_max_records_reached() {
        let mut w = impl_with(2, 3600.0);
        w.buffer.push("a".into());
        assert!(!w.due());
        w.buffer.push("b".into());
        assert!(w.due());
    }

    #[test]
    fn not_due_before_interval_elapses() {
        let mut w = impl_with(100, 3600.0);
        w.window_start = Some(Instant::now());
        w.buffer.push("a".into());
        assert!(!w.due());
    }

    #[test]
    fn due_once_interval_elapses() {
        let mut w = impl_with(100, 0.0);
        w.window_start = Some(Instant::now() - Duration::from_secs(1));
        w.buffer.push("a".into());
        assert!(w.due());
    }
}
