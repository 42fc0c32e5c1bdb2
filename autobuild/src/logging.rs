//! Development-time tracing for debugging the orchestrator.
//!
//! Diagnostics go to stderr via `RUST_LOG`; they are not part of the
//! engine's persisted artifacts (feature logs, cost log) which are always
//! written regardless of the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output: stderr, compact format.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
