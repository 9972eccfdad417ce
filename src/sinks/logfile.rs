//! `LogfileWriter`: writes records to `<filebase>-YYYY-MM-DD.log`, rolling
//! to a new file at UTC midnight (spec.md §4.1 "rolling-date logfile").

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::WriterDescription;
use rvdas_core::stage::{StageContext, Writer, WriterConfig};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

fn default_use_timestamps() -> bool {
    true
}

/// `{filebase, use_timestamps?}`. When `use_timestamps` is false the
/// writer targets a single `<filebase>.log` file without date rolling —
/// the CLI's `--logfile_use_timestamps` flag toggles this (spec.md §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogfileWriterConfig {
    pub filebase: String,
    #[serde(default = "default_use_timestamps")]
    pub use_timestamps: bool,
}

inventory::submit! {
    WriterDescription::new::<LogfileWriterConfig>("LogfileWriter")
}

#[async_trait]
impl WriterConfig for LogfileWriterConfig {
    async fn build(&self, cx: StageContext) -> anyhow::Result<Box<dyn Writer>> {
        tracing::debug!(stage = %cx.name, filebase = %self.filebase, "starting logfile writer");
        Ok(Box::new(LogfileWriterImpl {
            filebase: self.filebase.clone(),
            use_timestamps: self.use_timestamps,
            current_date: None,
            file: None,
        }))
    }

    fn accepts(&self) -> Option<RecordKind> {
        None
    }
}

struct LogfileWriterImpl {
    filebase: String,
    use_timestamps: bool,
    current_date: Option<NaiveDate>,
    file: Option<File>,
}

impl LogfileWriterImpl {
    fn path_for(&self, date: NaiveDate) -> String {
        if self.use_timestamps {
            format!("{}-{}.log", self.filebase, date.format("%Y-%m-%d"))
        } else {
            format!("{}.log", self.filebase)
        }
    }

    async fn ensure_current_file(&mut self) -> anyhow::Result<()> {
        let today = Utc::now().date_naive();
        if self.file.is_some() && (!self.use_timestamps || self.current_date == Some(today)) {
            return Ok(());
        }
        let path = self.path_for(today);
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        self.file = Some(file);
        self.current_date = Some(today);
        Ok(())
    }
}

#[async_trait]
impl Writer for LogfileWriterImpl {
    async fn write(&mut self, record: Record) -> anyhow::Result<()> {
        let Some(text) = record.as_text() else {
            anyhow::bail!("LogfileWriter cannot render a structured record without a formatter");
        };
        self.ensure_current_file().await?;
        let file = self.file.as_mut().expect("ensured above");
        file.write_all(text.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }

    async fn flush(&mut self) -> anyhow::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush().await?;
        }
        Ok(())
    }
}
