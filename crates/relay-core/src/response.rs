//! Response types for the relay.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token usage reported by the upstream service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    pub input_tokens: u32,
    /// Tokens produced in the completion
    pub output_tokens: u32,
}

impl Usage {
    /// Create a new usage record
    #[must_use]
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens processed
    #[must_use]
    pub fn total(&self) -> u64 {
        u64::from(self.input_tokens) + u64::from(self.output_tokens)
    }

    /// Add another usage record to this one
    pub fn add(&mut self, other: &Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Reason the upstream service stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop (end of message)
    Stop,
    /// Hit the max-token budget
    Length,
    /// Content was filtered
    ContentFilter,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Length => write!(f, "length"),
            Self::ContentFilter => write!(f, "content_filter"),
        }
    }
}

/// A completed chat response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Unique response identifier
    pub id: String,

    /// Model that produced the completion
    pub model: String,

    /// Assembled completion text
    pub content: String,

    /// Token usage for this response
    pub usage: Usage,

    /// Why generation stopped
    pub finish_reason: FinishReason,

    /// Creation timestamp (Unix epoch seconds)
    pub created: i64,
}

impl ChatResponse {
    /// Create a new response builder
    #[must_use]
    pub fn builder() -> ChatResponseBuilder {
        ChatResponseBuilder::default()
    }
}

/// Builder for `ChatResponse`
#[derive(Debug, Default)]
pub struct ChatResponseBuilder {
    id: Option<String>,
    model: Option<String>,
    content: String,
    usage: Option<Usage>,
    finish_reason: Option<FinishReason>,
}

impl ChatResponseBuilder {
    /// Set the response ID
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the model
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the completion text
    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Set the usage
    #[must_use]
    pub fn usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Set the finish reason
    #[must_use]
    pub fn finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }

    /// Build the response
    #[must_use]
    pub fn build(self) -> ChatResponse {
        ChatResponse {
            id: self
                .id
                .unwrap_or_else(|| format!("msg-{}", uuid::Uuid::new_v4())),
            model: self.model.unwrap_or_default(),
            content: self.content,
            usage: self.usage.unwrap_or_default(),
            finish_reason: self.finish_reason.unwrap_or(FinishReason::Stop),
            created: Utc::now().timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_builder() {
        let response = ChatResponse::builder()
            .model("claude-3-5-sonnet-20241022")
            .content("Hello!")
            .usage(Usage::new(10, 5))
            .finish_reason(FinishReason::Stop)
            .build();

        assert_eq!(response.model, "claude-3-5-sonnet-20241022");
        assert_eq!(response.content, "Hello!");
        assert_eq!(response.usage.total(), 15);
        assert!(response.id.starts_with("msg-"));
    }

    #[test]
    fn test_usage_add() {
        let mut usage = Usage::new(10, 5);
        usage.add(&Usage::new(20, 10));
        assert_eq!(usage.input_tokens, 30);
        assert_eq!(usage.output_tokens, 15);
        assert_eq!(usage.total(), 45);
    }

    #[test]
    fn test_finish_reason_display() {
        assert_eq!(FinishReason::Stop.to_string(), "stop");
        assert_eq!(FinishReason::Length.to_string(), "length");
        assert_eq!(FinishReason::ContentFilter.to_string(), "content_filter");
    }

    #[test]
    fn test_response_serialization() {
        let response = ChatResponse::builder()
            .id("msg-test")
            .model("claude-3-haiku-20240307")
            .content("Hi")
            .usage(Usage::new(5, 1))
            .build();

        let json = serde_json::to_string(&response).expect("serialize");
        let parsed: ChatResponse = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, response);
    }
}
