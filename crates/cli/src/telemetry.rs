//! Tracing subscriber installation.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use serde::Deserialize;
use thiserror::Error;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::{fmt, EnvFilter};

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// The `[telemetry]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct TelemetryConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG` when set.
    pub(crate) log_filter: String,
    pub(crate) log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_owned(),
            log_format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("invalid log filter `{filter}`: {message}")]
    Filter { filter: String, message: String },
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Installs the global subscriber once; later calls are no-ops.
pub(crate) fn initialise(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    INSTALLED.get_or_try_init(|| install(config)).map(|_| ())
}

fn install(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = filter_for(config)?;
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal());
    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = match config.log_format {
        LogFormat::Compact => Box::new(builder.compact().finish()),
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
    };

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn filter_for(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| config.log_filter.clone());
    EnvFilter::try_new(&directives).map_err(|error| TelemetryError::Filter {
        filter: directives,
        message: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_filters_are_reported() {
        let config = TelemetryConfig {
            log_filter: "dispatch=notalevel".to_owned(),
            log_format: LogFormat::Compact,
        };
        // RUST_LOG would take precedence over the configured filter.
        if std::env::var(EnvFilter::DEFAULT_ENV).is_ok() {
            return;
        }
        let error = filter_for(&config).expect_err("invalid level");
        assert!(error.to_string().contains("dispatch=notalevel"));
    }

    #[test]
    fn initialising_twice_is_harmless() {
        let config = TelemetryConfig::default();
        initialise(&config).expect("first install");
        initialise(&config).expect("second install is a no-op");
    }

    #[test]
    fn concurrent_initialisation_installs_once() {
        let workers: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| initialise(&TelemetryConfig::default()).is_ok()))
            .collect();

        for worker in workers {
            assert!(worker.join().expect("worker finished"));
        }
    }
}
