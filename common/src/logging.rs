//! Tracing subscriber setup shared by the pipeline binaries.
//!
//! Lines go to stdout so a log shipper can pick them up. `RUST_LOG` takes
//! precedence over the configured level.

use crate::config::{LogConfig, LogFormat};
use crate::{Error, Result};
use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "info";

pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.as_deref().unwrap_or(DEFAULT_LEVEL)))
        .map_err(|e| Error::InvalidInput(format!("Invalid log filter: {}", e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_target(true);

    let installed = match config.format {
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Text => builder.try_init(),
    };

    installed.map_err(|e| Error::Other(format!("Failed to install tracing subscriber: {}", e)))
}
