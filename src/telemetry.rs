//! Structured logging setup shared by both binaries (spec.md §2 ambient
//! stack): `tracing-subscriber`'s `fmt` layer with an `EnvFilter` read from
//! `RUST_LOG`, defaulting to `info`. Every stage and the manager log
//! through `tracing`'s structured fields rather than formatting their own
//! strings.

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. Safe to call more than once
/// per process (e.g. from tests); later calls are ignored.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
