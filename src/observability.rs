//! Tracing subscriber setup for binaries
//!
//! The library only emits events; binaries call `init_tracing` once at
//! startup. `RUST_LOG` wins over the configured level when set.

use crate::config::LoggingConfig;
use crate::error::{AnalyticsError, Result};
use tracing_subscriber::EnvFilter;

pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| AnalyticsError::Config(format!("invalid log filter {:?}: {}", config.level, e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| AnalyticsError::Config(format!("tracing already initialised: {}", e)))
}
