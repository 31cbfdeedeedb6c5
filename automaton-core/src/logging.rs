//! ABOUTME: Process-wide structured logging initialization
//! ABOUTME: Single entry point so every binary configures tracing the same way

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Respects `RUST_LOG`, defaulting to `info` when unset. Called once from
/// each binary's `main`; library crates only ever call `tracing::*` macros.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(true).try_init()?;
    Ok(())
}
