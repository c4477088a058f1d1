//! Configuration loading from files and environment.
//!
//! Loads TOML configuration with `${VAR}` environment substitution and
//! validates the result before handing it out.

use crate::schema::RelayConfig;
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::info;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// The path that was not found
        path: String,
    },

    /// IO error
    #[error("IO error reading configuration: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Validation error
    #[error("Configuration validation error: {0}")]
    Validation(String),

    /// Environment variable referenced but not set
    #[error("Environment variable not found: {name}")]
    EnvVarNotFound {
        /// The missing variable's name
        name: String,
    },
}

/// Configuration source
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Path to a TOML file
    File(String),
    /// Raw TOML string
    Toml(String),
    /// Built-in defaults
    Default,
}

/// Configuration loader
#[derive(Debug, Default)]
pub struct ConfigLoader {
    source: Option<ConfigSource>,
}

impl ConfigLoader {
    /// Create a new config loader
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration source
    #[must_use]
    pub fn with_source(mut self, source: ConfigSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Set a file source
    #[must_use]
    pub fn with_file(self, path: impl Into<String>) -> Self {
        self.with_source(ConfigSource::File(path.into()))
    }

    /// Load and validate the configuration
    ///
    /// # Errors
    /// Returns `ConfigError` if the source cannot be read, parsed, or fails
    /// validation
    pub async fn load(self) -> Result<RelayConfig, ConfigError> {
        let config = match self.source.unwrap_or(ConfigSource::Default) {
            ConfigSource::File(path) => Self::load_file(&path).await?,
            ConfigSource::Toml(content) => Self::parse(&content)?,
            ConfigSource::Default => RelayConfig::default(),
        };

        config
            .validate_config()
            .map_err(|e| ConfigError::Validation(format!("{e}")))?;

        info!("Configuration loaded");
        Ok(config)
    }

    async fn load_file(path: &str) -> Result<RelayConfig, ConfigError> {
        let path = Path::new(path);
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let content = fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<RelayConfig, ConfigError> {
        let content = substitute_env_vars(content)?;
        Ok(toml::from_str(&content)?)
    }
}

/// Replace `${VAR}` references with environment variable values
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated reference; keep the literal text.
            result.push_str(&rest[start..]);
            return Ok(result);
        };
        let name = &after[..end];
        let value = std::env::var(name).map_err(|_| ConfigError::EnvVarNotFound {
            name: name.to_string(),
        })?;
        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}
