//! Logging setup

use innertone_core::{InnertoneError, InnertoneResult};
use tracing_subscriber::EnvFilter;

use crate::LoggingConfig;

/// Install the global subscriber. `RUST_LOG` wins over `config.filter`.
///
/// Fails instead of panicking when a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> InnertoneResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| InnertoneError::Config(e.to_string()))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| InnertoneError::Config(e.to_string()))
}
