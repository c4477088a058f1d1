//! # Relay Service
//!
//! The request orchestrator for the resilient LLM request layer. For each
//! logical call it consults the response cache, falls through to the
//! retry-wrapped upstream operation on a miss, populates the cache on
//! success, and relays or replays streams so callers cannot tell cached and
//! live deliveries apart.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod observer;
pub mod service;
pub mod stats;

// Re-export main types
pub use observer::{NoopObserver, ObserverError, SessionObserver};
pub use service::{EventStream, RequestService, RequestServiceBuilder};
pub use stats::ServiceStats;
