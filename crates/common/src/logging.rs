//! Logging utilities for the service registry.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize tracing with the plain text formatter.
///
/// RUST_LOG takes precedence over `default_level` when set.
pub fn init(default_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter(default_level))
        .init();
}

/// Initialize tracing with JSON formatting (useful for structured logging).
pub fn init_json(default_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(env_filter(default_level))
        .init();
}

/// Build the filter shared by every subscriber setup.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}
