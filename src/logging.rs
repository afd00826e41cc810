//! Tracing setup for hosts that don't install their own subscriber.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "notify_sync=info";

/// Initialize a fmt subscriber with an env-overridable filter.
///
/// Fails when a global subscriber is already installed.
pub fn init() -> crate::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .map_err(|e| crate::Error::Other(format!("Failed to install tracing subscriber: {}", e)))
}
