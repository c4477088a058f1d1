//! # Relay Config
//!
//! Typed configuration for the LLM request layer: a validated schema with
//! sensible defaults and a loader supporting TOML files with environment
//! variable substitution.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod loader;
pub mod schema;

// Re-export main types
pub use loader::{ConfigError, ConfigLoader, ConfigSource};
pub use schema::{CacheSettings, RelayConfig, RetrySettings, StreamSettings};
