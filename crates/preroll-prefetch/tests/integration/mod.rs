//! Integration tests for the prefetch cache.
//!
//! These run the scheduler against a real `HttpLoader` and a wiremock
//! server, on the real clock, so backoffs are configured in milliseconds.

mod connection;
mod http_prefetch;

use std::sync::Once;
use std::time::Duration;

static TRACING: Once = Once::new();

/// Install a fmt subscriber once per test binary
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "preroll_prefetch=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
