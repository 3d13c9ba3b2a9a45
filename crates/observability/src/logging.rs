//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Install the process-wide JSON subscriber.
///
/// `RUST_LOG` wins over `default_level` when it is set and parses. Safe to
/// call multiple times (subsequent calls are no-ops).
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // JSON logs + timestamps.
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(default_level, "tracing initialized");
    }
}
