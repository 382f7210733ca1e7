//! Diagnostic logging for the binary.
//!
//! Library code only emits `tracing` events; installing a subscriber is left to
//! the process entry point.
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `debug` or `shell_dispatch=trace`.
pub const LOG_ENV: &str = "SHELL_DISPATCH_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Install a stderr subscriber filtered by [`LOG_ENV`]. Calling it twice is harmless.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
