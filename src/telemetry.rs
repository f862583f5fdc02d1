//! Logging initialization.

use crate::config::{LogFormat, LoggingArgs};
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize the tracing subscriber. Logs go to stderr so stdout stays
/// machine-readable.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this twice is
/// harmless: the second subscriber is not installed.
pub fn init(logging: &LoggingArgs) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.log_level));

    let installed = match logging.log_format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Pretty => fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
