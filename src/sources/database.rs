//! `DatabaseReader`: polls a SQLite table for new rows, emitting each as a
//! text record (spec.md §4.1 "database" reader).

use async_trait::async_trait;
use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::ReaderDescription;
use rvdas_core::stage::{ReadOutcome, Reader, ReaderConfig, StageContext};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_poll_interval() -> f64 {
    1.0
}
fn default_id_column() -> String {
    "id".to_string()
}

/// `{db_path, table, text_column, id_column?, poll_interval?}`. Rows are
/// delivered in ascending `id_column` order; the reader remembers the
/// highest id seen and only emits newer rows on each poll.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseReaderConfig {
    pub db_path: String,
    pub table: String,
    pub text_column: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: f64,
}

inventory::submit! {
    ReaderDescription::new::<DatabaseReaderConfig>("DatabaseReader")
}

#[async_trait]
impl ReaderConfig for DatabaseReaderConfig {
    async fn build(&self, cx: StageContext) -> anyhow::Result<Box<dyn Reader>> {
        tracing::debug!(stage = %cx.name, db = %self.db_path, table = %self.table, "opening database reader");
        Ok(Box::new(DatabaseReaderImpl {
            config: self.clone(),
            last_id: 0,
            pending: std::collections::VecDeque::new(),
        }))
    }

    fn produces(&self) -> RecordKind {
        RecordKind::Text
    }

    fn restartable(&self) -> bool {
        true
    }
}

struct DatabaseReaderImpl {
    config: DatabaseReaderConfig,
    last_id: i64,
    pending: std::collections::VecDeque<(i64, String)>,
}

#[async_trait]
impl Reader for DatabaseReaderImpl {
    async fn read(&mut self) -> anyhow::Result<ReadOutcome> {
        loop {
            if let Some((id, text)) = self.pending.pop_front() {
                self.last_id = id;
                return Ok(ReadOutcome::Record(Record::text(text)));
            }
            let config = self.config.clone();
            let last_id = self.last_id;
            let rows = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<(i64, String)>> {
                let conn = rusqlite::Connection::open(&config.db_path)?;
                let sql = format!(
                    "SELECT {}, {} FROM {} WHERE {} > ?1 ORDER BY {} ASC",
                    config.id_column,
                    config.text_column,
                    config.table,
                    config.id_column,
                    config.id_column
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([last_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await??;

            if rows.is_empty() {
                tokio::time::sleep(Duration::from_secs_f64(self.config.poll_interval.max(0.01)))
                    .await;
                continue;
            }
            self.pending.extend(rows);
        }
    }
}
