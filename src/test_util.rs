//! Test-only helpers shared across this crate's unit and integration
//! tests, patterned on the teacher's own `src/test_util.rs`: a handful of
//! free functions for cross-cutting test needs rather than a harness
//! framework.

use std::net::{SocketAddr, TcpListener};
use std::sync::Once;

static TRACE_INIT: Once = Once::new();

/// Install the crate's tracing subscriber once per test process, filtered
/// by `RUST_LOG` (default `off`, so test output stays quiet unless asked).
pub fn trace_init() {
    TRACE_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "off".to_string());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
            .try_init();
    });
}

/// An unused local address, claimed by binding to port 0 and immediately
/// releasing it. Used by tests that need a socket address before the
/// component under test binds it for real (UDP/TCP readers and writers).
pub fn next_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local_addr")
}

/// `len` random alphanumeric characters, for synthetic record bodies.
pub fn random_string(len: usize) -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
