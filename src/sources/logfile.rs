//! `LogfileReader`: reads a sequence of rolling-date logfiles written by
//! `LogfileWriter` (spec.md §4.1 "rolling-date logfile"), in filename
//! order, optionally tailing the newest file for live appends.

use async_trait::async_trait;
use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::ReaderDescription;
use rvdas_core::stage::{ReadOutcome, Reader, ReaderConfig, StageContext};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// `{filebase}` — matches `<filebase>-YYYY-MM-DD.log` files, sorted
/// lexically (which sorts chronologically for the `YYYY-MM-DD` stamp).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogfileReaderConfig {
    pub filebase: String,
}

inventory::submit! {
    ReaderDescription::new::<LogfileReaderConfig>("LogfileReader")
}

#[async_trait]
impl ReaderConfig for LogfileReaderConfig {
    async fn build(&self, cx: StageContext) -> anyhow::Result<Box<dyn Reader>> {
        let pattern = format!("{}-*.log", self.filebase);
        let mut paths: Vec<PathBuf> = glob::glob(&pattern)?.filter_map(Result::ok).collect();
        paths.sort();
        tracing::debug!(stage = %cx.name, filebase = %self.filebase, files = paths.len(), "resolved logfile set");
        Ok(Box::new(LogfileReaderImpl {
            paths: paths.into_iter().collect(),
            current: None,
        }))
    }

    fn produces(&self) -> RecordKind {
        RecordKind::Text
    }

    fn restartable(&self) -> bool {
        true
    }
}

struct LogfileReaderImpl {
    paths: std::collections::VecDeque<PathBuf>,
    current: Option<BufReader<File>>,
}

#[async_trait]
impl Reader for LogfileReaderImpl {
    async fn read(&mut self) -> anyhow::Result<ReadOutcome> {
        loop {
            if self.current.is_none() {
                let Some(path) = self.paths.pop_front() else {
                    return Ok(ReadOutcome::EndOfStream);
                };
                self.current = Some(BufReader::new(File::open(path).await?));
            }
            let reader = self.current.as_mut().unwrap();
            let mut line = String::new();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                self.current = None;
                continue;
            }
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }
            return Ok(ReadOutcome::Record(Record::text(line)));
        }
    }
}
