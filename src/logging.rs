//! Logging initialization and configuration.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor an explicit level is given.
pub const DEFAULT_FILTER: &str = "tunnel_rules=info";

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize the logging system.
///
/// Uses the `RUST_LOG` environment variable for filtering. If not set,
/// defaults to `tunnel_rules=info`.
///
/// # Panics
///
/// Panics if called more than once, or if another tracing subscriber
/// has already been set.
pub fn init() {
    tracing_subscriber::registry()
        .with(default_filter())
        .with(tracing_subscriber::fmt::layer().compact())
        .init();
}

/// Try to initialize the logging system.
///
/// Returns `Ok(())` if successful, or `Err` if logging has already been
/// initialized.
pub fn try_init() -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(default_filter())
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
}

/// Try to initialize logging with an explicit filter directive.
///
/// A bare level such as `debug` is scoped to this crate; anything else is
/// handed to [`EnvFilter`] as-is.
pub fn try_init_with(filter: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(filter_for(filter))
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
}

fn filter_for(level: &str) -> EnvFilter {
    let lower = level.to_ascii_lowercase();
    let directive = match lower.as_str() {
        "error" | "warn" | "info" | "debug" | "trace" => format!("tunnel_rules={}", lower),
        _ => level.to_string(),
    };
    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
