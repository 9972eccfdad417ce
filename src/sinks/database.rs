//! `DatabaseWriter`: appends each record's text to a SQLite table (spec.md
//! §4.1 "database" writer), creating the table on first write if absent.

use async_trait::async_trait;
use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::WriterDescription;
use rvdas_core::stage::{StageContext, Writer, WriterConfig};
use serde::{Deserialize, Serialize};

fn default_text_column() -> String {
    "text".to_string()
}

/// `{db_path, table, text_column?}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseWriterConfig {
    pub db_path: String,
    pub table: String,
    #[serde(default = "default_text_column")]
    pub text_column: String,
}

inventory::submit! {
    WriterDescription::new::<DatabaseWriterConfig>("DatabaseWriter")
}

#[async_trait]
impl WriterConfig for DatabaseWriterConfig {
    async fn build(&self, cx: StageContext) -> anyhow::Result<Box<dyn Writer>> {
        let config = self.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let conn = rusqlite::Connection::open(&config.db_path)?;
            conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY AUTOINCREMENT, {} TEXT NOT NULL, received_at REAL NOT NULL)",
                    config.table, config.text_column
                ),
                [],
            )?;
            Ok(())
        })
        .await??;
        tracing::debug!(stage = %cx.name, db = %self.db_path, table = %self.table, "opened database writer");
        Ok(Box::new(DatabaseWriterImpl {
            config: self.clone(),
        }))
    }

    fn accepts(&self) -> Option<RecordKind> {
        None
    }
}

struct DatabaseWriterImpl {
    config: DatabaseWriterConfig,
}

#[async_trait]
impl Writer for DatabaseWriterImpl {
    async fn write(&mut self, record: Record) -> anyhow::Result<()> {
        let Some(text) = record.as_text() else {
            anyhow::bail!("DatabaseWriter cannot render a structured record without a formatter");
        };
        let text = text.into_owned();
        let config = self.config.clone();
        let now = chrono_epoch_seconds();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let conn = rusqlite::Connection::open(&config.db_path)?;
            conn.execute(
                &format!(
                    "INSERT INTO {} ({}, received_at) VALUES (?1, ?2)",
                    config.table, config.text_column
                ),
                rusqlite::params![text, now],
            )?;
            Ok(())
        })
        .await??;
        Ok(())
    }
}

fn chrono_epoch_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
