//! Logging setup for embedding hosts
//!
//! Structured logs go to standard error so the agent's own stdout transport
//! stays clean. Hosts that already install a `tracing` subscriber should
//! skip this and let their own setup apply.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing with an env-driven filter writing to stderr
///
/// `RUST_LOG` takes precedence; otherwise `debug` selects between the
/// `info` and `debug` default levels. Calling twice is harmless: the
/// second install attempt is ignored.
pub fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
