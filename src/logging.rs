//! Diagnostic logging setup.
//!
//! Human-readable output goes to stderr; when enabled, the same events are
//! also written as one JSON object per line to a daily rolling file.

use crate::config::LoggingConfig;
use crate::{Error, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const LOG_FILE_PREFIX: &str = "symgraph.log";

/// Filter directive: `RUST_LOG` wins, then `--verbose`, then the config.
pub fn filter_directive(config: &LoggingConfig, verbose: bool) -> String {
    match std::env::var("RUST_LOG") {
        Ok(value) if !value.trim().is_empty() => value,
        _ if verbose => "debug".to_string(),
        _ => config.level.clone(),
    }
}

/// Install the global subscriber. Keep the returned guard alive until exit
/// so buffered file output is flushed.
pub fn init(config: &LoggingConfig, root: &Path, verbose: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(filter_directive(config, verbose))
        .map_err(|e| Error::Config(format!("invalid log filter: {}", e)))?;

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (json_layer, guard) = if config.json_file {
        let directory = root.join(&config.directory);
        std::fs::create_dir_all(&directory)?;
        let appender = tracing_appender::rolling::daily(&directory, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().json().with_current_span(false).with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(json_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_prefers_verbose_over_config() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            ..LoggingConfig::default()
        };
        if std::env::var("RUST_LOG").is_err() {
            assert_eq!(filter_directive(&config, true), "debug");
            assert_eq!(filter_directive(&config, false), "warn");
        }
    }
}
