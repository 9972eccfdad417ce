//! The Cached Data Server itself (spec.md §4.6): a websocket listener
//! speaking the `fields`/`describe`/`subscribe`/`ready`/`publish` protocol
//! of §6, a UDP ingest port accepting bare `publish` payloads, and a
//! background cleanup tick.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rvdas_core::record::Scalar;
use rvdas_core::ShutdownSignal;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{watch, Notify};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::cache::{FieldCache, RetentionPolicy};
use super::protocol::{ClientMessage, FieldSubscription, PublishData, PublishValue, ServerMessage};

/// `{websocket_addr?, udp_port?, retention, cleanup_interval}` (spec.md §6
/// `--data_server_websocket`, §4.6 `cleanup` interval).
#[derive(Clone, Debug)]
pub struct CachedDataServerConfig {
    pub websocket_addr: Option<SocketAddr>,
    pub udp_port: Option<u16>,
    pub retention: RetentionPolicy,
    pub cleanup_interval: Duration,
}

impl Default for CachedDataServerConfig {
    fn default() -> Self {
        Self {
            websocket_addr: None,
            udp_port: None,
            retention: RetentionPolicy::default(),
            cleanup_interval: Duration::from_secs(10),
        }
    }
}

pub struct CachedDataServer {
    cache: Arc<FieldCache>,
    config: CachedDataServerConfig,
    /// Signaled whenever any field is published, so subscriber tasks can
    /// wake and check for new matching data instead of polling tightly.
    changed: Arc<Notify>,
}

impl CachedDataServer {
    pub fn new(config: CachedDataServerConfig) -> Self {
        Self {
            cache: Arc::new(FieldCache::new(config.retention)),
            config,
            changed: Arc::new(Notify::new()),
        }
    }

    pub fn cache(&self) -> Arc<FieldCache> {
        self.cache.clone()
    }

    /// Ingest one `publish` payload directly, bypassing the network —
    /// used by the in-process status publisher (spec.md §4.4 "Publication
    /// uses the Cached Data Server's field-cache interface").
    pub fn ingest(&self, data: &PublishData) {
        apply_publish(&self.cache, data);
        self.changed.notify_waiters();
    }

    /// Run the server until `shutdown` resolves: the websocket listener,
    /// the UDP ingest port, and the cleanup tick, all concurrently.
    pub async fn run(&self, shutdown: ShutdownSignal) -> anyhow::Result<()> {
        let mut tasks = Vec::new();

        if let Some(addr) = self.config.websocket_addr {
            let cache = self.cache.clone();
            let changed = self.changed.clone();
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = run_websocket_listener(addr, cache, changed, shutdown).await {
                    tracing::error!(error = %e, "cached data server websocket listener exited");
                }
            }));
        }

        if let Some(port) = self.config.udp_port {
            let cache = self.cache.clone();
            let changed = self.changed.clone();
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = run_udp_ingest(port, cache, changed, shutdown).await {
                    tracing::error!(error = %e, "cached data server UDP ingest exited");
                }
            }));
        }

        let cache = self.cache.clone();
        let interval = self.config.cleanup_interval;
        let mut shutdown_for_cleanup = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => cache.cleanup(),
                    _ = &mut shutdown_for_cleanup => break,
                }
            }
        }));

        for task in tasks {
            let _ = task.await;
        }
        Ok(())
    }
}

async fn run_udp_ingest(
    port: u16,
    cache: Arc<FieldCache>,
    changed: Arc<Notify>,
    mut shutdown: ShutdownSignal,
) -> anyhow::Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "cached data server UDP ingest listening");
    let mut buf = vec![0u8; 65536];
    loop {
        tokio::select! {
            result = socket.recv(&mut buf) => {
                let n = result?;
                match serde_json::from_slice::<PublishData>(&buf[..n]) {
                    Ok(data) => {
                        apply_publish(&cache, &data);
                        changed.notify_waiters();
                    }
                    Err(e) => tracing::debug!(error = %e, "dropped malformed UDP publish payload"),
                }
            }
            _ = &mut shutdown => return Ok(()),
        }
    }
}

async fn run_websocket_listener(
    addr: SocketAddr,
    cache: Arc<FieldCache>,
    changed: Arc<Notify>,
    mut shutdown: ShutdownSignal,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "cached data server websocket listening");
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let cache = cache.clone();
                let changed = changed.clone();
                let conn_shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, cache, changed, conn_shutdown).await {
                        tracing::debug!(%peer, error = %e, "cached data server connection ended");
                    }
                });
            }
            _ = &mut shutdown => return Ok(()),
        }
    }
}

struct Subscription {
    field: String,
    seconds: f64,
    back_records: Option<usize>,
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    cache: Arc<FieldCache>,
    changed: Arc<Notify>,
    mut shutdown: ShutdownSignal,
) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();
    let mut subscriptions: Vec<Subscription> = Vec::new();
    // `ready` starts true: the first batch does not wait for an ack
    // (spec.md §4.6 ready/ack dispatch).
    let (ready_tx, mut ready_rx) = watch::channel(true);

    loop {
        tokio::select! {
            msg = stream.next() => {
                let Some(msg) = msg else { return Ok(()) };
                let msg = msg?;
                if !msg.is_text() && !msg.is_binary() {
                    continue;
                }
                let text = msg.into_text()?;
                let parsed: Result<ClientMessage, _> = serde_json::from_str(&text);
                match parsed {
                    Ok(ClientMessage::Fields) => {
                        let data = serde_json::json!(cache.fields());
                        send(&mut sink, ServerMessage::ok("fields", data)).await?;
                    }
                    Ok(ClientMessage::Describe { fields }) => {
                        let targets = if fields.is_empty() { cache.fields() } else { fields };
                        let described: serde_json::Map<String, serde_json::Value> = targets
                            .into_iter()
                            .map(|f| {
                                let meta = cache.describe(&f);
                                (f, serde_json::to_value(meta).unwrap_or(serde_json::Value::Null))
                            })
                            .collect();
                        send(&mut sink, ServerMessage::ok("describe", described.into())).await?;
                    }
                    Ok(ClientMessage::Subscribe { fields }) => {
                        subscriptions = fields
                            .into_iter()
                            .map(|(field, FieldSubscription { seconds, back_records })| Subscription {
                                field,
                                seconds,
                                back_records,
                            })
                            .collect();
                        send(&mut sink, ServerMessage::ok("subscribe", serde_json::json!({}))).await?;
                        deliver_snapshot(&mut sink, &cache, &subscriptions).await?;
                    }
                    Ok(ClientMessage::Ready) => {
                        let _ = ready_tx.send(true);
                    }
                    Ok(ClientMessage::Publish { data }) => {
                        apply_publish(&cache, &data);
                        changed.notify_waiters();
                        send(&mut sink, ServerMessage::ok("publish", serde_json::json!({}))).await?;
                    }
                    Err(e) => {
                        send(&mut sink, ServerMessage::err("error", 400, e.to_string())).await?;
                    }
                }
            }
            _ = changed.notified(), if !subscriptions.is_empty() => {
                if *ready_rx.borrow() {
                    deliver_snapshot(&mut sink, &cache, &subscriptions).await?;
                    let _ = ready_tx.send(false);
                }
            }
            _ = &mut shutdown => return Ok(()),
        }
    }
}

async fn deliver_snapshot(
    sink: &mut (impl futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    cache: &FieldCache,
    subscriptions: &[Subscription],
) -> anyhow::Result<()> {
    let mut fields = serde_json::Map::new();
    for sub in subscriptions {
        let snapshot = cache.query(&sub.field, sub.seconds, sub.back_records);
        if snapshot.samples.is_empty() {
            continue;
        }
        fields.insert(
            sub.field.clone(),
            serde_json::to_value(snapshot.samples).unwrap_or(serde_json::Value::Null),
        );
    }
    if fields.is_empty() {
        return Ok(());
    }
    send(sink, ServerMessage::ok("data", serde_json::json!({ "fields": fields }))).await
}

async fn send(
    sink: &mut (impl futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    message: ServerMessage,
) -> anyhow::Result<()> {
    let text = serde_json::to_string(&message)?;
    sink.send(WsMessage::Text(text)).await?;
    Ok(())
}

fn apply_publish(cache: &FieldCache, data: &PublishData) {
    for (field, value) in &data.fields {
        match value {
            PublishValue::Scalar(scalar) => {
                let ts = data.timestamp.unwrap_or_else(now_seconds);
                cache.publish(field, ts, scalar.clone());
            }
            PublishValue::Series(series) => {
                for (ts, scalar) in series {
                    cache.publish(field, *ts, scalar.clone());
                }
            }
        }
    }
    if let Some(metadata) = &data.metadata {
        for (field, meta) in &metadata.fields {
            cache.set_metadata(field, meta.clone());
        }
    }
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn apply_publish_stores_scalar_with_data_timestamp() {
        let cache = FieldCache::new(RetentionPolicy::default());
        let mut fields = IndexMap::new();
        fields.insert("depth".to_string(), PublishValue::Scalar(Scalar::Float(3.0)));
        let data = PublishData {
            timestamp: Some(42.0),
            fields,
            metadata: None,
        };
        apply_publish(&cache, &data);
        let snap = cache.query("depth", -1.0, None);
        assert_eq!(snap.samples, vec![(42.0, Scalar::Float(3.0))]);
    }
}
