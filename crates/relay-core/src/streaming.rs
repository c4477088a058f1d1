//! Streaming types for the relay.
//!
//! `UpstreamChunk` is the item yielded by the upstream client's native
//! stream; `StreamEvent` is the event sequence the orchestrator exposes to
//! callers, identical in shape whether served live or replayed from cache.

use crate::response::{ChatResponse, FinishReason, Usage};
use serde::{Deserialize, Serialize};

/// One item of an upstream stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpstreamChunk {
    /// Incremental completion text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Usage totals, reported once near the end of the stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Finish reason, only on the final chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl UpstreamChunk {
    /// Create a content delta chunk
    #[must_use]
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    /// Create a usage-only chunk
    #[must_use]
    pub fn usage(usage: Usage) -> Self {
        Self {
            usage: Some(usage),
            ..Self::default()
        }
    }

    /// Create a final chunk carrying usage and a finish reason
    #[must_use]
    pub fn finish(usage: Usage, reason: FinishReason) -> Self {
        Self {
            content: None,
            usage: Some(usage),
            finish_reason: Some(reason),
        }
    }

    /// Check if this is the final chunk
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// Event yielded by the orchestrator's streaming path
///
/// The yielded sequence is the source of truth for consumers; a stream is
/// finite, non-restartable, and ends after `Completed`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A slice of completion text, in order
    Content(String),
    /// Usage totals for the request
    Usage(Usage),
    /// The fully assembled response; always the last event
    Completed(ChatResponse),
}

impl StreamEvent {
    /// Get the content slice, if this is a content event
    #[must_use]
    pub fn as_content(&self) -> Option<&str> {
        match self {
            Self::Content(text) => Some(text),
            _ => None,
        }
    }

    /// Check if this event terminates the stream
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}
