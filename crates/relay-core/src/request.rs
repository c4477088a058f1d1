//! Request types for the relay.
//!
//! Defines the message list sent upstream together with the per-call options
//! callers use to steer caching and retry behavior.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Validation error raised by the request builder
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Temperature value out of range
    #[error("Invalid temperature {value}: must be between {min} and {max}")]
    InvalidTemperature {
        /// The invalid value provided
        value: f32,
        /// Minimum allowed value
        min: f32,
        /// Maximum allowed value
        max: f32,
    },

    /// No messages were supplied
    #[error("Request must contain at least one message")]
    EmptyMessages,

    /// No model identifier was supplied
    #[error("Request must name a model")]
    MissingModel,
}

/// Role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instruction
    System,
    /// End-user turn
    User,
    /// Model turn
    Assistant,
}

impl MessageRole {
    /// Stable wire string for this role
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role
    pub role: MessageRole,
    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// A fully assembled upstream request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model identifier
    pub model: String,

    /// Ordered conversation messages
    pub messages: Vec<ChatMessage>,

    /// System prompt, kept separate from the message list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Output token budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Create a new request builder
    #[must_use]
    pub fn builder() -> ChatRequestBuilder {
        ChatRequestBuilder::default()
    }
}

/// Builder for `ChatRequest`
#[derive(Debug, Default)]
pub struct ChatRequestBuilder {
    model: Option<String>,
    messages: Vec<ChatMessage>,
    system_prompt: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl ChatRequestBuilder {
    /// Minimum allowed temperature
    pub const TEMPERATURE_MIN: f32 = 0.0;
    /// Maximum allowed temperature
    pub const TEMPERATURE_MAX: f32 = 2.0;

    /// Set the model
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the message list
    #[must_use]
    pub fn messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// Append a message
    #[must_use]
    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Set the system prompt
    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the sampling temperature
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the output token budget
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Build the request
    ///
    /// # Errors
    /// Returns `ValidationError` if the model is missing, the message list is
    /// empty, or the temperature is outside `[0.0, 2.0]`
    pub fn build(self) -> Result<ChatRequest, ValidationError> {
        let model = self.model.ok_or(ValidationError::MissingModel)?;
        if model.is_empty() {
            return Err(ValidationError::MissingModel);
        }
        if self.messages.is_empty() {
            return Err(ValidationError::EmptyMessages);
        }
        if let Some(t) = self.temperature {
            if !(Self::TEMPERATURE_MIN..=Self::TEMPERATURE_MAX).contains(&t) {
                return Err(ValidationError::InvalidTemperature {
                    value: t,
                    min: Self::TEMPERATURE_MIN,
                    max: Self::TEMPERATURE_MAX,
                });
            }
        }

        Ok(ChatRequest {
            model,
            messages: self.messages,
            system_prompt: self.system_prompt,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
    }
}

/// Retry knobs a caller may override per request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOptions {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Per-call options for the request orchestrator
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Output token budget
    pub max_tokens: Option<u32>,
    /// System prompt
    pub system_prompt: Option<String>,
    /// Consult and populate the response cache
    pub use_cache: bool,
    /// Retry transient failures automatically
    pub auto_retry: bool,
    /// Retry overrides; service defaults apply when unset
    pub retry: Option<RetryOptions>,
    /// TTL override for the cache entry written by this call
    pub cache_ttl: Option<Duration>,
    /// Session the request belongs to, for token accounting
    pub session_id: Option<String>,
    /// Project the request belongs to, for diagnostics
    pub project_path: Option<PathBuf>,
}

impl RequestOptions {
    /// Create options for the given model with caching and auto-retry on
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            max_tokens: None,
            system_prompt: None,
            use_cache: true,
            auto_retry: true,
            retry: None,
            cache_ttl: None,
            session_id: None,
            project_path: None,
        }
    }

    /// Set the sampling temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the output token budget
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the system prompt
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Enable or disable the response cache for this call
    #[must_use]
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Enable or disable automatic retries for this call
    #[must_use]
    pub fn with_auto_retry(mut self, auto_retry: bool) -> Self {
        self.auto_retry = auto_retry;
        self
    }

    /// Override the retry policy for this call
    #[must_use]
    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Override the cache TTL for the entry written by this call
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Attach a session identifier
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Attach a project path
    #[must_use]
    pub fn with_project_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_path = Some(path.into());
        self
    }
}
