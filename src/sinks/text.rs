//! `TextWriter`: appends a record's text to stdout or a plain file
//! (spec.md §4.1 "text/stdout"; §6 CLI `--write_file PATH|-`).

use async_trait::async_trait;
use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::WriterDescription;
use rvdas_core::stage::{StageContext, Writer, WriterConfig};
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// `{path}`. `path == "-"` writes to stdout.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TextWriterConfig {
    pub path: String,
}

inventory::submit! {
    WriterDescription::new::<TextWriterConfig>("TextWriter")
}

#[async_trait]
impl WriterConfig for TextWriterConfig {
    async fn build(&self, cx: StageContext) -> anyhow::Result<Box<dyn Writer>> {
        let sink: Box<dyn AsyncWrite + Send + Unpin> = if self.path == "-" {
            Box::new(tokio::io::stdout())
        } else {
            tracing::debug!(stage = %cx.name, path = %self.path, "opening text writer file");
            Box::new(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .await?,
            )
        };
        Ok(Box::new(TextWriterImpl { sink }))
    }

    fn accepts(&self) -> Option<RecordKind> {
        None
    }
}

struct TextWriterImpl {
    sink: Box<dyn AsyncWrite + Send + Unpin>,
}

#[async_trait]
impl Writer for TextWriterImpl {
    async fn write(&mut self, record: Record) -> anyhow::Result<()> {
        let Some(text) = record.as_text() else {
            anyhow::bail!("TextWriter cannot render a structured record without a formatter");
        };
        self.sink.write_all(text.as_bytes()).await?;
        self.sink.write_all(b"\n").await?;
        Ok(())
    }

    async fn flush(&mut self) -> anyhow::Result<()> {
        self.sink.flush().await?;
        Ok(())
    }
}
