//! `SerialReader`: reads newline/EOL-delimited records off a serial port
//! using `tokio-serial`, matching the async-serial pattern used by the
//! broader pack's instrument-control crates (grounded on
//! `other_examples/manifests/easternanemone-rust-daq`'s `tokio-serial`
//! dependency; the teacher itself has no serial transport).

use async_trait::async_trait;
use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::ReaderDescription;
use rvdas_core::stage::{ReadOutcome, Reader, ReaderConfig, StageContext};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_serial::SerialPortBuilderExt;

fn default_baud_rate() -> u32 {
    9600
}
fn default_eol() -> String {
    "\n".to_string()
}

/// `{port, baud_rate?, eol?}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerialReaderConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_eol")]
    pub eol: String,
    #[serde(default = "default_restartable")]
    pub restartable: bool,
}

fn default_restartable() -> bool {
    true
}

inventory::submit! {
    ReaderDescription::new::<SerialReaderConfig>("SerialReader")
}

#[async_trait]
impl ReaderConfig for SerialReaderConfig {
    async fn build(&self, cx: StageContext) -> anyhow::Result<Box<dyn Reader>> {
        let port = tokio_serial::new(&self.port, self.baud_rate).open_native_async()?;
        tracing::debug!(stage = %cx.name, port = %self.port, baud = self.baud_rate, "opened serial port");
        Ok(Box::new(SerialReaderImpl {
            lines: BufReader::new(port),
            eol: self.eol.clone(),
        }))
    }

    fn produces(&self) -> RecordKind {
        RecordKind::Text
    }

    fn restartable(&self) -> bool {
        self.restartable
    }
}

struct SerialReaderImpl {
    lines: BufReader<tokio_serial::SerialStream>,
    eol: String,
}

#[async_trait]
impl Reader for SerialReaderImpl {
    async fn read(&mut self) -> anyhow::Result<ReadOutcome> {
        let delim = self.eol.as_bytes().first().copied().unwrap_or(b'\n');
        let mut buf = Vec::new();
        let n = self.lines.read_until(delim, &mut buf).await?;
        if n == 0 {
            return Ok(ReadOutcome::EndOfStream);
        }
        while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
            buf.pop();
        }
        let text = String::from_utf8_lossy(&buf).into_owned();
        Ok(ReadOutcome::Record(Record::text(text)))
    }
}
