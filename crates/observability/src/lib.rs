//! Shared tracing setup for the workflow engine.

use tracing_subscriber::EnvFilter;

/// Initialize process-wide structured logging.
///
/// JSON output, filter configurable via `RUST_LOG`, `info` by default.
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
