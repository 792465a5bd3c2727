//! Tracing subscriber setup.
//!
//! The engine only emits `tracing` events; installing a subscriber is the
//! embedding application's first step, before any listener or connection is
//! created.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` takes precedence over `config.filter`. Returns `false` if a
/// global subscriber was already installed; logging setup never fails the
/// caller.
pub fn init_logging(config: &LogConfig) -> bool {
    let filter = env_filter(config);

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(config.with_thread_names)
        .with_level(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init()
        .is_ok()
}

/// Build the filter from `RUST_LOG`, falling back to the configured directive.
pub fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
