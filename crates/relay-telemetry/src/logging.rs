//! Structured logging configuration.
//!
//! Thin wrapper over `tracing-subscriber` with a serde-friendly config so
//! log level, format and filter directives can come from the config file.

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Extra filter directives (e.g. "hyper=warn")
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Pretty,
            filter: None,
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the log level
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Enable JSON output
    #[must_use]
    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    /// Set filter directives
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// The tracing `Level` for the configured string
    #[must_use]
    pub fn tracing_level(&self) -> Level {
        match self.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" | "warning" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (structured)
    Json,
    /// Pretty format (human-readable)
    #[default]
    Pretty,
    /// Compact format
    Compact,
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Failed to install the subscriber
    #[error("Failed to initialize logging: {0}")]
    Init(String),
    /// Failed to parse filter directives
    #[error("Failed to parse log filter: {0}")]
    FilterParse(String),
}

/// Initialize logging with the given configuration
///
/// # Errors
/// Returns `LoggingError` if the filter cannot be parsed or a subscriber is
/// already installed
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    if !config.enabled {
        return Ok(());
    }

    let filter = build_filter(config)?;
    let registry = tracing_subscriber::registry();

    match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_filter(filter))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_target(true).with_filter(filter))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(true).with_filter(filter))
            .try_init(),
    }
    .map_err(|e| LoggingError::Init(e.to_string()))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    // RUST_LOG wins over the configured level.
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directives = match &config.filter {
        Some(extra) => format!("{},{}", config.level, extra),
        None => config.level.clone(),
    };
    EnvFilter::try_new(directives).map_err(|e| LoggingError::FilterParse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = LoggingConfig::new()
            .with_level("debug")
            .json()
            .with_filter("hyper=warn");

        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter.as_deref(), Some("hyper=warn"));
    }

    #[test]
    fn test_tracing_level() {
        assert_eq!(LoggingConfig::new().with_level("trace").tracing_level(), Level::TRACE);
        assert_eq!(LoggingConfig::new().with_level("DEBUG").tracing_level(), Level::DEBUG);
        assert_eq!(LoggingConfig::new().with_level("warn").tracing_level(), Level::WARN);
        assert_eq!(LoggingConfig::new().with_level("invalid").tracing_level(), Level::INFO);
    }

    #[test]
    fn test_disabled_logging_is_a_noop() {
        let config = LoggingConfig {
            enabled: false,
            ..LoggingConfig::default()
        };
        assert!(init_logging(&config).is_ok());
    }

    #[test]
    fn test_format_serde_roundtrip() {
        let json = serde_json::to_string(&LogFormat::Compact).unwrap();
        assert_eq!(json, "\"compact\"");
        let parsed: LogFormat = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, LogFormat::Compact);
    }
}
