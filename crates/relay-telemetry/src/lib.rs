//! # Relay Telemetry
//!
//! Structured logging setup for the LLM request layer.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;

// Re-export main types
pub use logging::{init_logging, LogFormat, LoggingConfig, LoggingError};
