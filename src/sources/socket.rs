//! `UDPReader` and `TCPReader` (listen or connect mode), spec.md §4.1.

use async_trait::async_trait;
use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::ReaderDescription;
use rvdas_core::stage::{ReadOutcome, Reader, ReaderConfig, StageContext};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

fn default_restartable() -> bool {
    true
}

/// `{port, host?}` — binds and reads datagrams.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UdpReaderConfig {
    pub port: u16,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_restartable")]
    pub restartable: bool,
}

inventory::submit! {
    ReaderDescription::new::<UdpReaderConfig>("UDPReader")
}

#[async_trait]
impl ReaderConfig for UdpReaderConfig {
    async fn build(&self, cx: StageContext) -> anyhow::Result<Box<dyn Reader>> {
        let host = self.host.clone().unwrap_or_else(|| "0.0.0.0".to_string());
        let addr = format!("{host}:{}", self.port);
        let socket = UdpSocket::bind(&addr).await?;
        tracing::debug!(stage = %cx.name, %addr, "bound UDP reader");
        Ok(Box::new(UdpReaderImpl {
            socket,
            buf: vec![0u8; 65536],
        }))
    }

    fn produces(&self) -> RecordKind {
        RecordKind::Bytes
    }

    fn restartable(&self) -> bool {
        self.restartable
    }
}

struct UdpReaderImpl {
    socket: UdpSocket,
    buf: Vec<u8>,
}

#[async_trait]
impl Reader for UdpReaderImpl {
    async fn read(&mut self) -> anyhow::Result<ReadOutcome> {
        let (n, _from) = self.socket.recv_from(&mut self.buf).await?;
        Ok(ReadOutcome::Record(Record::Bytes(
            self.buf[..n].to_vec().into(),
        )))
    }
}

/// Whether a `TCPReader` dials out (`connect`) or accepts inbound
/// connections (`listen`); spec.md §4.1 "TCP/UDP socket (listen/connect)".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TcpMode {
    #[default]
    Listen,
    Connect,
}

/// `{mode?, host, port, eol?}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TcpReaderConfig {
    #[serde(default)]
    pub mode: TcpMode,
    pub host: String,
    pub port: u16,
    #[serde(default = "default_eol")]
    pub eol: String,
    #[serde(default = "default_restartable")]
    pub restartable: bool,
}

fn default_eol() -> String {
    "\n".to_string()
}

inventory::submit! {
    ReaderDescription::new::<TcpReaderConfig>("TCPReader")
}

#[async_trait]
impl ReaderConfig for TcpReaderConfig {
    async fn build(&self, cx: StageContext) -> anyhow::Result<Box<dyn Reader>> {
        let stream = match self.mode {
            TcpMode::Connect => {
                let addr = format!("{}:{}", self.host, self.port);
                tracing::debug!(stage = %cx.name, %addr, "connecting TCP reader");
                TcpStream::connect(&addr).await?
            }
            TcpMode::Listen => {
                let addr = format!("{}:{}", self.host, self.port);
                let listener = TcpListener::bind(&addr).await?;
                tracing::debug!(stage = %cx.name, %addr, "listening for TCP reader");
                let (stream, peer) = listener.accept().await?;
                tracing::debug!(stage = %cx.name, %peer, "accepted TCP connection");
                stream
            }
        };
        Ok(Box::new(TcpReaderImpl {
            lines: BufReader::new(stream),
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

struct TcpReaderImpl {
    lines: BufReader<TcpStream>,
    eol: String,
}

#[async_trait]
impl Reader for TcpReaderImpl {
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
        Ok(ReadOutcome::Record(Record::text(
            String::from_utf8_lossy(&buf).into_owned(),
        )))
    }
}
