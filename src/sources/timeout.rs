//! `TimeoutReader`: wraps another Reader, emitting a synthetic record if
//! the wrapped reader has been silent for more than `timeout` seconds
//! (spec.md §4.1, §7 "Timeout").

use async_trait::async_trait;
use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::{build_reader, ReaderDescription};
use rvdas_core::stage::{ReadOutcome, Reader, ReaderConfig, StageContext};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::StageSpec;

fn default_message() -> String {
    "TIMEOUT".to_string()
}

/// `{reader, timeout, message?}` — `reader` is a nested `StageSpec`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeoutReaderConfig {
    pub reader: StageSpec,
    pub timeout: f64,
    #[serde(default = "default_message")]
    pub message: String,
}

inventory::submit! {
    ReaderDescription::new::<TimeoutReaderConfig>("TimeoutReader")
}

#[async_trait]
impl ReaderConfig for TimeoutReaderConfig {
    async fn build(&self, cx: StageContext) -> anyhow::Result<Box<dyn Reader>> {
        let inner_config = build_reader(
            &self.reader.class,
            self.reader.module.as_deref(),
            self.reader.kwargs_value(),
        )?;
        let inner = inner_config.build(cx).await?;
        Ok(Box::new(TimeoutReaderImpl {
            inner,
            timeout: Duration::from_secs_f64(self.timeout.max(0.01)),
            message: self.message.clone(),
        }))
    }

    fn produces(&self) -> RecordKind {
        RecordKind::Text
    }

    fn restartable(&self) -> bool {
        true
    }
}

struct TimeoutReaderImpl {
    inner: Box<dyn Reader>,
    timeout: Duration,
    message: String,
}

#[async_trait]
impl Reader for TimeoutReaderImpl {
    async fn read(&mut self) -> anyhow::Result<ReadOutcome> {
        match tokio::time::timeout(self.timeout, self.inner.read()).await {
            Ok(result) => result,
            Err(_) => Ok(ReadOutcome::Record(Record::text(self.message.clone()))),
        }
    }
}
