//! Process-wide tracing setup shared by billing binaries and services.

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::DEFAULT_FILTER);
}

/// Same as [`init`] with a different fallback filter, used when `RUST_LOG`
/// is unset (e.g. `"billing_infra=debug,info"`).
pub fn init_with_default_filter(default_filter: &str) {
    tracing::init(default_filter);
}

/// Subscriber construction (filter, JSON layer).
pub mod tracing;
