//! `PollingReader`: runs a command on a fixed interval and emits its
//! stdout as a record (spec.md §4.1 "polling reader (periodic)").

use async_trait::async_trait;
use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::ReaderDescription;
use rvdas_core::stage::{ReadOutcome, Reader, ReaderConfig, StageContext};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_interval() -> f64 {
    1.0
}

/// `{command, interval?}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollingReaderConfig {
    pub command: String,
    #[serde(default = "default_interval")]
    pub interval: f64,
}

inventory::submit! {
    ReaderDescription::new::<PollingReaderConfig>("PollingReader")
}

#[async_trait]
impl ReaderConfig for PollingReaderConfig {
    async fn build(&self, cx: StageContext) -> anyhow::Result<Box<dyn Reader>> {
        tracing::debug!(stage = %cx.name, command = %self.command, interval = self.interval, "starting polling reader");
        Ok(Box::new(PollingReaderImpl {
            command: self.command.clone(),
            interval: Duration::from_secs_f64(self.interval.max(0.01)),
            first: true,
        }))
    }

    fn produces(&self) -> RecordKind {
        RecordKind::Text
    }

    fn restartable(&self) -> bool {
        true
    }
}

struct PollingReaderImpl {
    command: String,
    interval: Duration,
    first: bool,
}

#[async_trait]
impl Reader for PollingReaderImpl {
    async fn read(&mut self) -> anyhow::Result<ReadOutcome> {
        if !self.first {
            tokio::time::sleep(self.interval).await;
        }
        self.first = false;
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .output()
            .await?;
        let text = String::from_utf8_lossy(&output.stdout)
            .trim_end()
            .to_string();
        Ok(ReadOutcome::Record(Record::text(text)))
    }
}
