//! Diagnostic tracing for levelrun.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. The run summary a
//! user reads is printed by [`crate::report`], and the durable record of a run
//! is `.levelrun/level{N}/last_run.json`; neither depends on `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=levelrun=debug levelrun 3 --mode process-only
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
