//! Logging setup for applications embedding the client.
//!
//! Library code only emits `tracing` events. Call [`init`] once from a
//! binary to print them.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "OCR_LANE_LOG";

const DEFAULT_FILTER: &str = "info";

/// The filter from `OCR_LANE_LOG`, or `info` when unset or invalid.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a formatting subscriber. Returns false if one was already set.
pub fn init() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .try_init()
        .is_ok()
}
