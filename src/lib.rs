//! rvdas: the shipboard logger runtime and logger manager.
//!
//! Re-exports of `rvdas-core`'s Record/stage/registry vocabulary, plus
//! every concrete Reader/Transform/Writer, the Listener engine, the Logger
//! Manager, the Cached Data Server, and the config loader.

pub mod cached_data_server;
pub mod config;
pub mod listener;
pub mod manager;
pub mod parser;
pub mod sinks;
pub mod sources;
pub mod telemetry;
pub mod transforms;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use rvdas_core::*;

/// Shared fallible-result alias for this crate's own error surface.
pub type Result<T> = anyhow::Result<T>;
