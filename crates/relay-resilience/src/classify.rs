//! Error classification for upstream failures.
//!
//! Maps any failure shape (structured API error, textual fault, or a raw
//! value) into a `ClassifiedError` carrying a stable code, a category,
//! recoverability and retryability flags, a user-facing message, and
//! suggested recovery actions. Classification is total: it never fails.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use relay_core::UpstreamError;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// How many classified errors the rolling history retains
const HISTORY_CAPACITY: usize = 100;

/// Category taxonomy for classified failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// API key missing or rejected (401)
    AuthInvalidApiKey,
    /// Account lacks permission for the request (403)
    AuthPermissionDenied,
    /// Request rate limit exceeded (429)
    AuthRateLimited,
    /// Malformed or rejected request (400)
    ApiInvalidRequest,
    /// Requested model does not exist (404)
    ApiModelNotFound,
    /// Conversation exceeds the model's context window
    ApiContextTooLong,
    /// Upstream service overloaded or erroring (5xx)
    ApiOverloaded,
    /// Network-level connection failure
    NetworkConnectionFailed,
    /// Operation timed out or was aborted
    NetworkTimeout,
    /// Client-side configuration or initialization fault
    SdkConfigurationError,
    /// Local storage quota exhausted
    StorageQuotaExceeded,
    /// Anything that did not match a known shape
    UnknownError,
}

impl ErrorCategory {
    /// Stable machine code for this category
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthInvalidApiKey => "AUTH_INVALID_API_KEY",
            Self::AuthPermissionDenied => "AUTH_PERMISSION_DENIED",
            Self::AuthRateLimited => "AUTH_RATE_LIMITED",
            Self::ApiInvalidRequest => "API_INVALID_REQUEST",
            Self::ApiModelNotFound => "API_MODEL_NOT_FOUND",
            Self::ApiContextTooLong => "API_CONTEXT_TOO_LONG",
            Self::ApiOverloaded => "API_OVERLOADED",
            Self::NetworkConnectionFailed => "NETWORK_CONNECTION_FAILED",
            Self::NetworkTimeout => "NETWORK_TIMEOUT",
            Self::SdkConfigurationError => "SDK_CONFIGURATION_ERROR",
            Self::StorageQuotaExceeded => "STORAGE_QUOTA_EXCEEDED",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Whether this category is retryable by default
    #[must_use]
    pub fn default_retryable(&self) -> bool {
        matches!(
            self,
            Self::AuthRateLimited
                | Self::ApiOverloaded
                | Self::NetworkConnectionFailed
                | Self::NetworkTimeout
        )
    }

    /// Whether the user can recover from this category without code changes
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::UnknownError)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A recovery action the caller can render to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryAction {
    /// Button label
    pub label: String,
    /// Whether this is the preferred action
    pub is_primary: bool,
    /// Whether the action discards user state
    pub is_destructive: bool,
}

impl RecoveryAction {
    /// Create a secondary, non-destructive action
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            is_primary: false,
            is_destructive: false,
        }
    }

    /// Create a primary action
    #[must_use]
    pub fn primary(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            is_primary: true,
            is_destructive: false,
        }
    }

    /// Mark the action as destructive
    #[must_use]
    pub fn destructive(mut self) -> Self {
        self.is_destructive = true;
        self
    }
}

/// Context captured alongside a classified failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Logical operation that failed (e.g. `send_message`)
    pub operation: String,
    /// Model in use, when known
    pub model: Option<String>,
    /// Session the request belonged to
    pub session_id: Option<String>,
    /// Project the request belonged to
    pub project_path: Option<String>,
    /// When the failure was classified
    pub occurred_at: DateTime<Utc>,
    /// Zero-based attempt number within the retry loop
    pub attempt: u32,
}

impl ErrorContext {
    /// Create a context for the named operation
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            model: None,
            session_id: None,
            project_path: None,
            occurred_at: Utc::now(),
            attempt: 0,
        }
    }

    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the session identifier
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the project path
    #[must_use]
    pub fn with_project_path(mut self, path: impl Into<String>) -> Self {
        self.project_path = Some(path.into());
        self
    }

    /// Set the attempt number
    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// When the failure occurred, as Unix epoch milliseconds
    #[must_use]
    pub fn occurred_at_epoch_ms(&self) -> i64 {
        self.occurred_at.timestamp_millis()
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new("unknown")
    }
}

/// Input accepted by the classifier
#[derive(Debug, Clone)]
pub enum Failure {
    /// An error that has already been classified
    Classified(ClassifiedError),
    /// A structured failure from the upstream boundary
    Upstream(UpstreamError),
    /// A generic fault carrying only a textual message
    Message(String),
    /// A raw value that is not an error at all
    Value(serde_json::Value),
}

impl From<ClassifiedError> for Failure {
    fn from(err: ClassifiedError) -> Self {
        Self::Classified(err)
    }
}

impl From<UpstreamError> for Failure {
    fn from(err: UpstreamError) -> Self {
        Self::Upstream(err)
    }
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<&str> for Failure {
    fn from(message: &str) -> Self {
        Self::Message(message.to_string())
    }
}

impl From<serde_json::Value> for Failure {
    fn from(value: serde_json::Value) -> Self {
        Self::Value(value)
    }
}

/// A failure normalized into the taxonomy, immutable after construction
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    /// Stable machine code (mirrors the category)
    pub code: &'static str,
    /// Taxonomy category
    pub category: ErrorCategory,
    /// Message from the original failure
    pub raw_message: String,
    /// Message suitable for rendering to the user
    pub user_message: String,
    /// Whether the user can recover without code changes
    pub recoverable: bool,
    /// Whether the retry controller may retry this failure
    pub retryable: bool,
    /// Suggested recovery actions, in render order
    pub actions: Vec<RecoveryAction>,
    /// Where and when the failure happened
    pub context: ErrorContext,
    /// The original upstream failure, when there was one
    pub cause: Option<Arc<UpstreamError>>,
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.raw_message)
    }
}

impl std::error::Error for ClassifiedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// History roll-up for diagnostics
#[derive(Debug, Clone, Default)]
pub struct ErrorHistoryStats {
    /// Errors currently retained in the history
    pub total: usize,
    /// Count per stable code
    pub by_code: HashMap<&'static str, usize>,
    /// The category seen most often, if any
    pub most_frequent: Option<ErrorCategory>,
}

/// Classifies failures and retains a bounded rolling history
pub struct ErrorClassifier {
    history: Mutex<VecDeque<ClassifiedError>>,
}

impl ErrorClassifier {
    /// Create a new classifier with an empty history
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
        }
    }

    /// Classify a failure
    ///
    /// Already-classified input is returned unchanged and is not recorded
    /// again. Every newly constructed error is appended to the history.
    pub fn classify(&self, failure: impl Into<Failure>, context: ErrorContext) -> ClassifiedError {
        let classified = match failure.into() {
            Failure::Classified(err) => return err,
            Failure::Upstream(err) => self.classify_upstream(err, context),
            Failure::Message(message) => self.classify_message(&message, None, context),
            Failure::Value(value) => {
                // Not an error shape at all; treat optimistically as transient noise.
                let raw = value.to_string();
                build(
                    ErrorCategory::UnknownError,
                    raw,
                    true,
                    context,
                    None,
                )
            }
        };

        debug!(
            code = classified.code,
            operation = %classified.context.operation,
            attempt = classified.context.attempt,
            retryable = classified.retryable,
            "Classified failure"
        );

        self.record(classified.clone());
        classified
    }

    fn classify_upstream(&self, err: UpstreamError, context: ErrorContext) -> ClassifiedError {
        match &err {
            UpstreamError::Api {
                status, message, ..
            } => {
                let message = message.clone();
                let cause = Some(Arc::new(err.clone()));
                match *status {
                    400 if is_context_overflow(&message) => build(
                        ErrorCategory::ApiContextTooLong,
                        message,
                        false,
                        context,
                        cause,
                    ),
                    400 => build(
                        ErrorCategory::ApiInvalidRequest,
                        message,
                        false,
                        context,
                        cause,
                    ),
                    401 => build(
                        ErrorCategory::AuthInvalidApiKey,
                        message,
                        false,
                        context,
                        cause,
                    ),
                    403 => build(
                        ErrorCategory::AuthPermissionDenied,
                        message,
                        false,
                        context,
                        cause,
                    ),
                    404 => build(
                        ErrorCategory::ApiModelNotFound,
                        message,
                        false,
                        context,
                        cause,
                    ),
                    429 => build(
                        ErrorCategory::AuthRateLimited,
                        message,
                        true,
                        context,
                        cause,
                    ),
                    500 | 502 | 503 | 504 => build(
                        ErrorCategory::ApiOverloaded,
                        message,
                        true,
                        context,
                        cause,
                    ),
                    other => build(
                        ErrorCategory::UnknownError,
                        message,
                        other >= 500,
                        context,
                        cause,
                    ),
                }
            }
            UpstreamError::Transport { message } | UpstreamError::Other { message } => {
                let message = message.clone();
                let cause = Some(Arc::new(err.clone()));
                self.classify_message(&message, cause, context)
            }
        }
    }

    fn classify_message(
        &self,
        message: &str,
        cause: Option<Arc<UpstreamError>>,
        context: ErrorContext,
    ) -> ClassifiedError {
        let lower = message.to_lowercase();

        // First match wins; order is part of the contract.
        let (category, retryable) = if contains_any(
            &lower,
            &[
                "network",
                "connection",
                "connect",
                "dns",
                "socket",
                "refused",
                "reset",
                "unreachable",
            ],
        ) {
            (ErrorCategory::NetworkConnectionFailed, true)
        } else if contains_any(&lower, &["timeout", "timed out", "abort", "deadline"]) {
            (ErrorCategory::NetworkTimeout, true)
        } else if contains_any(&lower, &["storage", "quota", "disk full", "no space"]) {
            (ErrorCategory::StorageQuotaExceeded, false)
        } else if contains_any(
            &lower,
            &["configuration", "config", "not initialized", "initialization"],
        ) {
            (ErrorCategory::SdkConfigurationError, false)
        } else {
            (ErrorCategory::UnknownError, false)
        };

        build(category, message.to_string(), retryable, context, cause)
    }

    fn record(&self, classified: ClassifiedError) {
        let mut history = self.history.lock();
        if history.len() >= HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(classified);
    }

    /// The most recent `n` classified errors, newest first
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<ClassifiedError> {
        let history = self.history.lock();
        history.iter().rev().take(n).cloned().collect()
    }

    /// Roll-up of the retained history
    #[must_use]
    pub fn history_stats(&self) -> ErrorHistoryStats {
        let history = self.history.lock();

        let mut by_code: HashMap<&'static str, usize> = HashMap::new();
        let mut by_category: HashMap<ErrorCategory, usize> = HashMap::new();
        for err in history.iter() {
            *by_code.entry(err.code).or_default() += 1;
            *by_category.entry(err.category).or_default() += 1;
        }

        let most_frequent = by_category
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map(|(category, _)| category);

        ErrorHistoryStats {
            total: history.len(),
            by_code,
            most_frequent,
        }
    }

    /// Discard the retained history
    pub fn clear_history(&self) {
        self.history.lock().clear();
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Heuristic for 400s that mean the conversation outgrew the context window
fn is_context_overflow(message: &str) -> bool {
    let lower = message.to_lowercase();
    contains_any(
        &lower,
        &[
            "context",
            "prompt is too long",
            "too many tokens",
            "maximum number of tokens",
        ],
    )
}

/// Assemble a `ClassifiedError` for a category
fn build(
    category: ErrorCategory,
    raw_message: String,
    retryable: bool,
    context: ErrorContext,
    cause: Option<Arc<UpstreamError>>,
) -> ClassifiedError {
    ClassifiedError {
        code: category.code(),
        category,
        raw_message,
        user_message: user_message(category).to_string(),
        recoverable: category.is_recoverable(),
        retryable,
        actions: actions_for(category),
        context,
        cause,
    }
}

fn user_message(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::AuthInvalidApiKey => {
            "Your API key was rejected. Check your credentials and try again."
        }
        ErrorCategory::AuthPermissionDenied => {
            "Your account does not have access to this feature or model."
        }
        ErrorCategory::AuthRateLimited => {
            "You are sending requests too quickly. The request will be retried shortly."
        }
        ErrorCategory::ApiInvalidRequest => {
            "The request was rejected by the service. Adjust the request and try again."
        }
        ErrorCategory::ApiModelNotFound => {
            "The selected model is not available. Pick a different model."
        }
        ErrorCategory::ApiContextTooLong => {
            "This conversation is too long for the model's context window."
        }
        ErrorCategory::ApiOverloaded => {
            "The service is temporarily overloaded. The request will be retried."
        }
        ErrorCategory::NetworkConnectionFailed => {
            "Could not reach the service. Check your network connection."
        }
        ErrorCategory::NetworkTimeout => "The request took too long and was cancelled.",
        ErrorCategory::SdkConfigurationError => {
            "The client is not configured correctly. Review your settings."
        }
        ErrorCategory::StorageQuotaExceeded => {
            "Local storage is full. Free up space and try again."
        }
        ErrorCategory::UnknownError => "Something went wrong. Please try again.",
    }
}

fn actions_for(category: ErrorCategory) -> Vec<RecoveryAction> {
    match category {
        ErrorCategory::ApiContextTooLong => vec![
            RecoveryAction::primary("Compact conversation"),
            RecoveryAction::new("Start new conversation").destructive(),
        ],
        ErrorCategory::AuthInvalidApiKey => {
            vec![RecoveryAction::primary("Open API key settings")]
        }
        ErrorCategory::AuthPermissionDenied => {
            vec![RecoveryAction::primary("Review plan & billing")]
        }
        ErrorCategory::ApiModelNotFound => {
            vec![RecoveryAction::primary("Choose another model")]
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ErrorContext {
        ErrorContext::new("send_message").with_model("claude-3-haiku-20240307")
    }

    #[test]
    fn test_status_families() {
        let classifier = ErrorClassifier::new();

        let cases: &[(u16, &str, ErrorCategory, bool)] = &[
            (400, "invalid request", ErrorCategory::ApiInvalidRequest, false),
            (401, "invalid x-api-key", ErrorCategory::AuthInvalidApiKey, false),
            (403, "forbidden", ErrorCategory::AuthPermissionDenied, false),
            (404, "model not found", ErrorCategory::ApiModelNotFound, false),
            (429, "rate limited", ErrorCategory::AuthRateLimited, true),
            (500, "internal error", ErrorCategory::ApiOverloaded, true),
            (502, "bad gateway", ErrorCategory::ApiOverloaded, true),
            (503, "overloaded", ErrorCategory::ApiOverloaded, true),
            (504, "gateway timeout", ErrorCategory::ApiOverloaded, true),
        ];

        for (status, message, category, retryable) in cases {
            let classified = classifier.classify(UpstreamError::api(*status, *message), ctx());
            assert_eq!(classified.category, *category, "status {status}");
            assert_eq!(classified.retryable, *retryable, "status {status}");
            assert!(classified.recoverable, "status {status}");
        }
    }

    #[test]
    fn test_context_overflow_detection() {
        let classifier = ErrorClassifier::new();

        let classified = classifier.classify(
            UpstreamError::api(400, "prompt is too long: 210000 tokens > 200000 maximum"),
            ctx(),
        );

        assert_eq!(classified.category, ErrorCategory::ApiContextTooLong);
        assert_eq!(classified.code, "API_CONTEXT_TOO_LONG");
        assert!(classified.recoverable);
        assert!(!classified.retryable);
        assert!(classified.actions[0].is_primary);
        assert!(classified.actions[1].is_destructive);
    }

    #[test]
    fn test_unknown_status_retryable_only_when_server_side() {
        let classifier = ErrorClassifier::new();

        let teapot = classifier.classify(UpstreamError::api(418, "teapot"), ctx());
        assert_eq!(teapot.category, ErrorCategory::UnknownError);
        assert!(!teapot.retryable);

        let variant = classifier.classify(UpstreamError::api(599, "odd"), ctx());
        assert_eq!(variant.category, ErrorCategory::UnknownError);
        assert!(variant.retryable);
    }

    #[test]
    fn test_textual_pattern_order() {
        let classifier = ErrorClassifier::new();

        let network = classifier.classify("connection refused by host", ctx());
        assert_eq!(network.category, ErrorCategory::NetworkConnectionFailed);
        assert!(network.retryable);

        let timeout = classifier.classify("operation timed out after 30s", ctx());
        assert_eq!(timeout.category, ErrorCategory::NetworkTimeout);
        assert!(timeout.retryable);

        let storage = classifier.classify("storage quota exceeded", ctx());
        assert_eq!(storage.category, ErrorCategory::StorageQuotaExceeded);
        assert!(!storage.retryable);

        let config = classifier.classify("client not initialized", ctx());
        assert_eq!(config.category, ErrorCategory::SdkConfigurationError);
        assert!(!config.retryable);

        let unknown = classifier.classify("some inexplicable fault", ctx());
        assert_eq!(unknown.category, ErrorCategory::UnknownError);
        assert!(!unknown.retryable);
    }

    #[test]
    fn test_network_wins_over_timeout_when_both_present() {
        let classifier = ErrorClassifier::new();
        let classified = classifier.classify("connection timed out", ctx());
        assert_eq!(classified.category, ErrorCategory::NetworkConnectionFailed);
    }

    #[test]
    fn test_raw_value_is_optimistically_transient() {
        let classifier = ErrorClassifier::new();
        let classified = classifier.classify(serde_json::json!({"weird": 42}), ctx());
        assert_eq!(classified.category, ErrorCategory::UnknownError);
        assert!(classified.retryable);
    }

    #[test]
    fn test_classify_is_idempotent() {
        let classifier = ErrorClassifier::new();
        let first = classifier.classify(UpstreamError::api(401, "nope"), ctx());
        let second = classifier.classify(first.clone(), ctx());

        assert_eq!(second.code, first.code);
        assert_eq!(second.category, first.category);
        assert_eq!(second.raw_message, first.raw_message);
        assert_eq!(second.context, first.context);
        // Pass-through is not recorded again.
        assert_eq!(classifier.history_stats().total, 1);
    }

    #[test]
    fn test_context_fields_carried() {
        let classifier = ErrorClassifier::new();
        let context = ErrorContext::new("send_message_stream")
            .with_model("claude-3-opus-20240229")
            .with_session_id("session-9")
            .with_attempt(2);

        let classified = classifier.classify(UpstreamError::api(429, "slow down"), context);
        assert_eq!(classified.context.operation, "send_message_stream");
        assert_eq!(classified.context.attempt, 2);
        assert_eq!(classified.context.session_id.as_deref(), Some("session-9"));
        assert!(classified.context.occurred_at_epoch_ms() > 0);
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error as _;

        let classifier = ErrorClassifier::new();
        let classified = classifier.classify(UpstreamError::api(503, "overloaded"), ctx());
        let source = classified.source().expect("cause retained");
        assert!(source.to_string().contains("503"));
    }

    #[test]
    fn test_history_capacity_and_stats() {
        let classifier = ErrorClassifier::new();

        for _ in 0..105 {
            classifier.classify(UpstreamError::api(429, "rate limited"), ctx());
        }
        classifier.classify(UpstreamError::api(401, "bad key"), ctx());

        let stats = classifier.history_stats();
        assert_eq!(stats.total, 100);
        assert_eq!(stats.most_frequent, Some(ErrorCategory::AuthRateLimited));
        assert_eq!(stats.by_code.get("AUTH_INVALID_API_KEY"), Some(&1));

        let recent = classifier.recent(1);
        assert_eq!(recent[0].category, ErrorCategory::AuthInvalidApiKey);

        classifier.clear_history();
        assert_eq!(classifier.history_stats().total, 0);
    }
}
