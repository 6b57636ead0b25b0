//! Tracing/logging initialization.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info";

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// Resolve the filter from `RUST_LOG`, falling back to `default_filter`.
pub fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install the JSON subscriber once per process.
///
/// Returns whether this call installed it. A subscriber installed by someone
/// else (a test harness, another library) is left in place.
pub fn init(default_filter: &str) -> bool {
    let mut installed_now = false;
    INSTALLED.get_or_init(|| {
        installed_now = tracing_subscriber::fmt()
            .with_env_filter(env_filter(default_filter))
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .with_target(false)
            .try_init()
            .is_ok();
        installed_now
    });
    installed_now
}
