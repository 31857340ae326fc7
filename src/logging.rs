//! Tracing initialisation.
//!
//! `RUST_LOG` wins when set; otherwise the configured application log level
//! applies to this crate and `warn` to everything else.

use tracing_subscriber::EnvFilter;

use crate::config::ApplicationConfig;

/// Build the filter the subscriber will use.
pub fn env_filter(app: &ApplicationConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,brew_cell={}", app.log_level)))
}

/// Install the global subscriber. Calling it twice is harmless; the second
/// call is ignored.
pub fn init(app: &ApplicationConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(app))
        .with_target(true)
        .try_init();
}
