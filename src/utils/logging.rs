//! Logging initialization for registry embedders
//!
//! Simple, non-overengineered logging setup that:
//! - Respects the RUST_LOG environment variable
//! - Falls back to a config-provided filter
//! - Defaults to "info" level
//!
//! # Usage
//!
//! ```rust,no_run
//! use modkit::utils::init_logging;
//!
//! init_logging(None); // Uses RUST_LOG or defaults to "info"
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging for the host application
///
/// RUST_LOG always takes precedence; the config filter applies only when
/// RUST_LOG is unset; "info" is the final fallback.
///
/// # Arguments
/// * `filter` - Optional log filter from config (e.g., "info", "modkit=debug")
pub fn init_logging(filter: Option<&str>) {
    let mut env_filter = EnvFilter::from_default_env();

    // Config filter applies only when RUST_LOG is not set
    if filter.is_some() && std::env::var("RUST_LOG").is_err() {
        if let Some(f) = filter {
            env_filter = EnvFilter::new(f);
        }
    }

    if std::env::var("RUST_LOG").is_err() && filter.is_none() {
        env_filter = EnvFilter::new("info");
    }

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true) // Include module path - useful for debugging
                .with_thread_ids(false) // Disable by default (can be noisy)
                .with_ansi(std::env::var("NO_COLOR").is_err()), // Respect NO_COLOR standard
        )
        .with(env_filter)
        .init();
}

/// Initialize logging with JSON output (for production/monitoring)
///
/// Useful when logs need to be parsed by log aggregation systems.
///
/// # Arguments
/// * `filter` - Optional log filter. If None, uses RUST_LOG or defaults to "info"
#[cfg(feature = "json-logging")]
pub fn init_json_logging(filter: Option<&str>) {
    let mut env_filter = EnvFilter::from_default_env();

    if filter.is_some() && std::env::var("RUST_LOG").is_err() {
        if let Some(f) = filter {
            env_filter = EnvFilter::new(f);
        }
    }

    if std::env::var("RUST_LOG").is_err() && filter.is_none() {
        env_filter = EnvFilter::new("info");
    }

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_span_list(true),
        )
        .with(env_filter)
        .init();
}

/// Initialize logging from a [`LoggingConfig`](crate::config::LoggingConfig)
///
/// RUST_LOG always takes precedence over the configured filter.
pub fn init_logging_from_config(config: Option<&crate::config::LoggingConfig>) {
    let filter = config.and_then(|c| c.filter.as_deref());

    if config.map(|c| c.json_format).unwrap_or(false) {
        #[cfg(feature = "json-logging")]
        {
            init_json_logging(filter);
        }
        #[cfg(not(feature = "json-logging"))]
        {
            // Fall back to plain logging if json-logging feature not enabled
            init_logging(filter);
        }
    } else {
        init_logging(filter);
    }
}
