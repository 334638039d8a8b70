//! Diagnostic tracing for the agent.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. It is separate from
//! session transcripts (`io/transcript`), which are product output and are
//! written whenever a transcript directory is requested.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. Defaults to `warn` when `RUST_LOG` is unset.
///
/// ```bash
/// RUST_LOG=sqlagent=debug sqlagent ask "How many orders were placed on Sundays?"
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
