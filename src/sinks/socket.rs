//! `UDPWriter` and `TCPWriter` (spec.md §4.1 "TCP/UDP socket").

use async_trait::async_trait;
use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::WriterDescription;
use rvdas_core::stage::{BackpressurePolicy, StageContext, Writer, WriterConfig};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};

fn default_queue_depth() -> usize {
    100
}

/// `{host?, port}` — sends each record as one UDP datagram to `host:port`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UdpWriterConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default)]
    pub backpressure: BackpressurePolicy,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

inventory::submit! {
    WriterDescription::new::<UdpWriterConfig>("UDPWriter")
}

#[async_trait]
impl WriterConfig for UdpWriterConfig {
    async fn build(&self, cx: StageContext) -> anyhow::Result<Box<dyn Writer>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let addr = format!("{}:{}", self.host, self.port);
        socket.connect(&addr).await?;
        tracing::debug!(stage = %cx.name, %addr, "connected UDP writer");
        Ok(Box::new(UdpWriterImpl { socket }))
    }

    fn accepts(&self) -> Option<RecordKind> {
        None
    }

    fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    fn backpressure(&self) -> BackpressurePolicy {
        self.backpressure
    }
}

struct UdpWriterImpl {
    socket: UdpSocket,
}

#[async_trait]
impl Writer for UdpWriterImpl {
    async fn write(&mut self, record: Record) -> anyhow::Result<()> {
        let bytes = record_bytes(&record)?;
        self.socket.send(&bytes).await?;
        Ok(())
    }
}

/// `{host, port, eol?}` — dials out and writes each record followed by
/// `eol`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TcpWriterConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_eol")]
    pub eol: String,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default)]
    pub backpressure: BackpressurePolicy,
}

fn default_eol() -> String {
    "\n".to_string()
}

inventory::submit! {
    WriterDescription::new::<TcpWriterConfig>("TCPWriter")
}

#[async_trait]
impl WriterConfig for TcpWriterConfig {
    async fn build(&self, cx: StageContext) -> anyhow::Result<Box<dyn Writer>> {
        let addr = format!("{}:{}", self.host, self.port);
        let stream = TcpStream::connect(&addr).await?;
        tracing::debug!(stage = %cx.name, %addr, "connected TCP writer");
        Ok(Box::new(TcpWriterImpl {
            stream,
            eol: self.eol.clone(),
        }))
    }

    fn accepts(&self) -> Option<RecordKind> {
        None
    }

    fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    fn backpressure(&self) -> BackpressurePolicy {
        self.backpressure
    }
}

struct TcpWriterImpl {
    stream: TcpStream,
    eol: String,
}

#[async_trait]
impl Writer for TcpWriterImpl {
    async fn write(&mut self, record: Record) -> anyhow::Result<()> {
        let bytes = record_bytes(&record)?;
        self.stream.write_all(&bytes).await?;
        self.stream.write_all(self.eol.as_bytes()).await?;
        Ok(())
    }

    async fn flush(&mut self) -> anyhow::Result<()> {
        self.stream.flush().await?;
        Ok(())
    }
}

fn record_bytes(record: &Record) -> anyhow::Result<Vec<u8>> {
    match record {
        Record::Bytes(b) => Ok(b.to_vec()),
        Record::Text(s) => Ok(s.as_bytes().to_vec()),
        Record::Structured(_) => Ok(serde_json::to_vec(record_as_json(record))?),
    }
}

fn record_as_json(record: &Record) -> &rvdas_core::record::StructuredRecord {
    record.as_structured().expect("checked by caller")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_record_becomes_utf8_bytes() {
        let bytes = record_bytes(&Record::text("hello")).unwrap();
        assert_eq!(bytes, b"hello");
    }
}
