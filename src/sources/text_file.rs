//! `TextFileReader`: reads lines from a file, optionally tailing it for
//! appended data (spec.md §4.1 "text-file (optionally tailed)").

use async_trait::async_trait;
use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::ReaderDescription;
use rvdas_core::stage::{ReadOutcome, Reader, ReaderConfig, StageContext};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader, SeekFrom};

fn default_tail_poll_interval() -> f64 {
    1.0
}

/// `{path, tail?, tail_poll_interval?}`. When `tail` is set, the reader
/// blocks at end-of-file and polls for newly appended lines rather than
/// signaling end-of-stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TextFileReaderConfig {
    pub path: String,
    #[serde(default)]
    pub tail: bool,
    #[serde(default = "default_tail_poll_interval")]
    pub tail_poll_interval: f64,
}

inventory::submit! {
    ReaderDescription::new::<TextFileReaderConfig>("TextFileReader")
}

#[async_trait]
impl ReaderConfig for TextFileReaderConfig {
    async fn build(&self, cx: StageContext) -> anyhow::Result<Box<dyn Reader>> {
        let file = File::open(&self.path).await?;
        tracing::debug!(stage = %cx.name, path = %self.path, tail = self.tail, "opened text file reader");
        Ok(Box::new(TextFileReaderImpl {
            reader: BufReader::new(file),
            tail: self.tail,
            poll_interval: Duration::from_secs_f64(self.tail_poll_interval.max(0.01)),
        }))
    }

    fn produces(&self) -> RecordKind {
        RecordKind::Text
    }

    fn restartable(&self) -> bool {
        true
    }
}

struct TextFileReaderImpl {
    reader: BufReader<File>,
    tail: bool,
    poll_interval: Duration,
}

#[async_trait]
impl Reader for TextFileReaderImpl {
    async fn read(&mut self) -> anyhow::Result<ReadOutcome> {
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).await?;
            if n > 0 {
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                return Ok(ReadOutcome::Record(Record::text(line)));
            }
            if !self.tail {
                return Ok(ReadOutcome::EndOfStream);
            }
            tokio::time::sleep(self.poll_interval).await;
            // Reset to the current stream position so a subsequent
            // `read_line` re-tries rather than observing a stale EOF.
            let pos = self.reader.stream_position().await?;
            self.reader.seek(SeekFrom::Start(pos)).await?;
        }
    }
}
