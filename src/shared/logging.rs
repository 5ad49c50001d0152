//! Usage: Opt-in tracing subscriber bootstrap for embedding binaries and tests.

use tracing_subscriber::EnvFilter;

const LOG_FILTER_ENV: &str = "BEARER_GUARD_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Install a fmt subscriber filtered by `BEARER_GUARD_LOG` (default `info`).
///
/// Embedding applications that already own a subscriber should skip this; the
/// crate itself only emits `tracing` events. Calling it twice is harmless.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
