//! # Relay Resilience
//!
//! Resilience building blocks for the LLM request layer:
//! - Error classification into a stable, actionable taxonomy
//! - Retry with exponential backoff and jitter, driven by classification
//! - Content-addressed response caching with TTL and savings analytics

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod classify;
pub mod retry;

// Re-export main types
pub use cache::{CacheConfig, CacheKey, CachePattern, CacheStats, ResponseCache};
pub use classify::{
    ClassifiedError, ErrorCategory, ErrorClassifier, ErrorContext, ErrorHistoryStats, Failure,
    RecoveryAction,
};
pub use retry::{RetryConfig, RetryPolicy};
