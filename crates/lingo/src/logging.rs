//! Process-wide log setup.
//!
//! Library code logs through both `log` and `tracing`; `init` installs a
//! `tracing` subscriber and bridges `log` records into it.

use std::io::IsTerminal;

use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

use crate::config::{LogConfig, LogFormat};
use crate::error::LingoError;

/// Builds the level filter. `RUST_LOG` wins over the configured level.
fn build_filter(env_directives: Option<&str>, level: &str) -> Result<EnvFilter, LingoError> {
    let directives = match env_directives {
        Some(directives) if !directives.trim().is_empty() => directives,
        _ => level,
    };
    EnvFilter::try_new(directives)
        .map_err(|e| LingoError::Logging(format!("invalid log filter: {}", e)))
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(config: &LogConfig) -> Result<(), LingoError> {
    let env_directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(env_directives.as_deref(), &config.level)?;

    let json_layer = (config.format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
    });
    let pretty_layer = (config.format == LogFormat::Pretty).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal())
    });

    let subscriber = Registry::default()
        .with(filter)
        .with(json_layer)
        .with(pretty_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LingoError::Logging(e.to_string()))?;
    tracing_log::LogTracer::init().map_err(|e| LingoError::Logging(e.to_string()))?;

    tracing::debug!(level = %config.level, format = ?config.format, "logging initialized");
    Ok(())
}
