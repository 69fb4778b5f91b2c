//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the process-wide `tracing` subscriber once, before any
//!   resource is acquired
//! - Select human-readable or JSON output
//! - Honour `RUST_LOG` over the configured level
//!
//! # Design Decisions
//! - The subscriber is never swapped at runtime; code that needs a scoped
//!   sink (tests) uses `tracing::subscriber::set_default` and drops the guard
//! - JSON format for production, pretty format for development

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogConfig, LogFormat};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level '{level}': {source}")]
    InvalidLevel {
        level: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("a global logger is already installed: {0}")]
    AlreadyInstalled(#[from] tracing_subscriber::util::TryInitError),
}

/// Build the filter: `RUST_LOG` if set, otherwise the configured level.
pub fn env_filter(config: &LogConfig) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level).map_err(|source| LoggingError::InvalidLevel {
            level: config.level.clone(),
            source,
        }),
    }
}

/// Install the global subscriber.
pub fn init_logging(config: &LogConfig) -> Result<(), LoggingError> {
    let filter = env_filter(config)?;

    let (pretty, json) = match config.format {
        LogFormat::Pretty => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage_levels() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LogConfig {
            level: "storage_gateway=notalevel".into(),
            format: LogFormat::Pretty,
        };
        assert!(matches!(
            env_filter(&config),
            Err(LoggingError::InvalidLevel { .. })
        ));
    }

    #[test]
    fn accepts_directives() {
        let config = LogConfig {
            level: "storage_gateway=debug,tower_http=info".into(),
            format: LogFormat::Json,
        };
        assert!(env_filter(&config).is_ok());
    }
}
