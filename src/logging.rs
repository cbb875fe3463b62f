use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::Config;

/// Initialize tracing for the embedding application.
///
/// `RUST_LOG` wins when set; otherwise the configured log level applies to
/// this crate and everything else stays at info. Calling it twice is a
/// no-op, so tests can call it freely.
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("scholia_client={},info", config.log_level))
    });

    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init();
}
