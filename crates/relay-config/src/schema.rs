//! Configuration schema definitions.
//!
//! All sections deserialize with defaults so a partial file is enough, and
//! validate ranges after loading. Durations are humantime strings ("1h",
//! "500ms").

use relay_telemetry::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Top-level relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RelayConfig {
    /// Response cache settings
    #[validate(nested)]
    pub cache: CacheSettings,

    /// Retry policy settings
    #[validate(nested)]
    pub retry: RetrySettings,

    /// Stream replay settings
    #[validate(nested)]
    pub stream: StreamSettings,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl RelayConfig {
    /// Validate the configuration
    ///
    /// # Errors
    /// Returns validation errors if any section is out of range
    pub fn validate_config(&self) -> Result<(), validator::ValidationErrors> {
        self.validate()
    }
}

/// Response cache settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CacheSettings {
    /// Whether caching is enabled
    pub enabled: bool,

    /// Maximum number of entries before oldest-created eviction
    #[validate(range(min = 1))]
    pub max_entries: usize,

    /// Default TTL for cache entries
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Interval for the periodic expired-entry sweep
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 500,
            default_ttl: Duration::from_secs(3600), // 1 hour
            sweep_interval: Duration::from_secs(300),
        }
    }
}

/// Retry policy settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RetrySettings {
    /// Retry transient failures automatically
    pub enabled: bool,

    /// Maximum retries after the first attempt
    #[validate(range(max = 10))]
    pub max_retries: u32,

    /// Base delay, doubled on each attempt
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,

    /// Upper bound of the uniform jitter added to each delay
    #[serde(with = "humantime_serde")]
    pub max_jitter: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_millis(1000),
        }
    }
}

/// Stream replay settings for cache hits
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StreamSettings {
    /// Characters per synthetic content chunk
    #[validate(range(min = 1, max = 4096))]
    pub replay_chunk_chars: usize,

    /// Cosmetic delay between synthetic chunks
    #[serde(with = "humantime_serde")]
    pub replay_delay: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            replay_chunk_chars: 48,
            replay_delay: Duration::from_millis(10),
        }
    }
}
