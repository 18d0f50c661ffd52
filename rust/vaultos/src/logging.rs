//! Tracing setup for the vaultos binaries.

use tracing_subscriber::EnvFilter;

/// Filter variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "VAULTOS_LOG";

/// Initialize tracing to `stderr`, keeping `stdout` free for listings.
///
/// The filter comes from `VAULTOS_LOG`, then `RUST_LOG`, then
/// `default_filter`.
pub fn init_logging_with_default(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(default_filter))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_filter))
}
