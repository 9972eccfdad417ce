//! A minimal Cached Data Server client: sends `publish` payloads over UDP
//! (spec.md §4.6 "a UDP ingest port"). Used by `CachedDataWriter` (a
//! pipeline Writer running in a separate Listener process) and, when the
//! manager's embedded Cached Data Server isn't used directly in-process,
//! by the status publisher.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use super::protocol::PublishData;

pub struct CachedDataClient {
    socket: UdpSocket,
}

impl CachedDataClient {
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(addr).await?;
        Ok(Self { socket })
    }

    pub async fn publish(&self, data: &PublishData) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(data)?;
        self.socket.send(&bytes).await?;
        Ok(())
    }
}
