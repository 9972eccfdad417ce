//! The Cached Data Server (spec.md §4.6): an in-memory time-windowed
//! field cache with websocket subscribe/publish and UDP ingest.

mod cache;
mod client;
mod protocol;
mod server;

pub use cache::{FieldCache, FieldSnapshot, RetentionPolicy};
pub use client::CachedDataClient;
pub use protocol::{
    ClientMessage, FieldSubscription, PublishData, PublishMetadata, PublishValue, ServerMessage,
};
pub use server::{CachedDataServer, CachedDataServerConfig};
