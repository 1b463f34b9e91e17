use std::sync::Mutex;

use tracing_subscriber::{self, prelude::*, EnvFilter};

use crate::config::{ConfigError, LoggingConfig};

/// Install the global subscriber. `RUST_LOG` wins over the configured
/// level. Logs go to stderr so command output on stdout stays parseable.
pub fn init(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            ConfigError::invalid(format!("log level {:?}: {}", config.level, e))
        })?,
    };

    let stderr_appender = tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    let result = if config.log_to_file {
        let file = std::fs::File::create(&config.log_file_path).map_err(|source| ConfigError::Read {
            path: config.log_file_path.clone(),
            source,
        })?;
        let file_appender = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_file(true)
            .with_line_number(true)
            .with_writer(Mutex::new(file));

        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_appender)
            .with(file_appender)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_appender)
            .try_init()
    };

    result.map_err(|e| ConfigError::Logging(e.to_string()))
}
