//! Data model and maintenance tooling for the zkbugs vulnerability dataset.

use tracing_subscriber::EnvFilter;

pub mod config;
pub mod dataset;
pub mod docs;
pub mod enrich;
pub mod export;
pub mod import;
pub mod llm;
pub mod similar;
pub mod stats;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Install the global `tracing` subscriber.
///
/// The filter is taken from `RUST_LOG`, defaulting to `info`. Calling this more than once is
/// harmless; only the first call installs a subscriber.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
