//! # Relay Core
//!
//! Core types for the resilient LLM request layer:
//! - Chat messages, requests and responses with validated builders
//! - Streaming chunk and event types
//! - The upstream client boundary trait and its structured failure type

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod request;
pub mod response;
pub mod streaming;
pub mod upstream;

// Re-export main types
pub use error::UpstreamError;
pub use request::{ChatMessage, ChatRequest, ChatRequestBuilder, MessageRole, RequestOptions, RetryOptions, ValidationError};
pub use response::{ChatResponse, ChatResponseBuilder, FinishReason, Usage};
pub use streaming::{StreamEvent, UpstreamChunk};
pub use upstream::{UpstreamClient, UpstreamStream};
