//! The request orchestrator.
//!
//! Composition root for the resilience pieces: cache consult, retry-wrapped
//! upstream calls, cache population on success, stream relay for live calls
//! and synthetic replay for cache hits. Each call is an independent unit of
//! work; the cache and the statistics recorder are the only shared state.

use crate::observer::{NoopObserver, SessionObserver};
use crate::stats::{ServiceStats, StatsRecorder};
use async_stream::{stream, try_stream};
use futures::stream::BoxStream;
use futures::StreamExt;
use relay_config::{RelayConfig, StreamSettings};
use relay_core::{
    ChatMessage, ChatRequest, ChatResponse, FinishReason, RequestOptions, StreamEvent,
    UpstreamClient, Usage,
};
use relay_resilience::{
    CacheConfig, CacheKey, CachePattern, CacheStats, ClassifiedError, ErrorCategory,
    ErrorClassifier, ErrorContext, ErrorHistoryStats, ResponseCache, RetryConfig, RetryPolicy,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// Stream of orchestrator events
pub type EventStream = BoxStream<'static, Result<StreamEvent, ClassifiedError>>;

/// The request orchestrator
///
/// Explicitly constructed and passed by handle; holds all owned state
/// (cache, statistics, classifier history) with no ambient globals.
pub struct RequestService {
    upstream: Arc<dyn UpstreamClient>,
    classifier: Arc<ErrorClassifier>,
    cache: Arc<ResponseCache>,
    stats: Arc<StatsRecorder>,
    observer: Arc<dyn SessionObserver>,
    retry_defaults: RetryConfig,
    retry_enabled: bool,
    stream_settings: StreamSettings,
    sweeper: Option<JoinHandle<()>>,
}

impl RequestService {
    /// Create a builder around the given upstream client
    #[must_use]
    pub fn builder(upstream: Arc<dyn UpstreamClient>) -> RequestServiceBuilder {
        RequestServiceBuilder::new(upstream)
    }

    /// Build a service from a loaded configuration
    #[must_use]
    pub fn from_config(config: &RelayConfig, upstream: Arc<dyn UpstreamClient>) -> Self {
        Self::builder(upstream)
            .cache_config(CacheConfig {
                enabled: config.cache.enabled,
                max_entries: config.cache.max_entries,
                default_ttl: config.cache.default_ttl,
                sweep_interval: config.cache.sweep_interval,
            })
            .retry_config(RetryConfig {
                max_retries: config.retry.max_retries,
                base_delay: config.retry.base_delay,
                max_jitter: config.retry.max_jitter,
            })
            .retry_enabled(config.retry.enabled)
            .stream_settings(config.stream.clone())
            .build()
    }

    /// Send a message list and wait for the complete response
    ///
    /// Consults the cache first when enabled; a hit returns immediately
    /// without touching the network. Misses go through the retry-wrapped
    /// upstream call and populate the cache on success.
    ///
    /// # Errors
    /// Returns the `ClassifiedError` for the final failure
    #[instrument(skip(self, messages, options), fields(model = %options.model))]
    pub async fn send_message(
        &self,
        messages: Vec<ChatMessage>,
        options: RequestOptions,
    ) -> Result<ChatResponse, ClassifiedError> {
        let started = Instant::now();
        let context = self.error_context("send_message", &options);

        let request = match self.build_request(&messages, &options) {
            Ok(request) => request,
            Err(err) => return Err(self.classifier.classify(err.to_string(), context)),
        };

        let key = self.cache_key(&messages, &options);
        if let Some(key) = &key {
            if let Some(response) = self.cache.get(key) {
                debug!(fingerprint = %key.fingerprint(), "Serving response from cache");
                self.stats.record_cache_hit();
                self.notify_tokens(options.session_id.as_deref(), &response.usage)
                    .await;
                return Ok(response);
            }
        }

        let policy = self.retry_policy(&options);
        let upstream = Arc::clone(&self.upstream);
        let request = Arc::new(request);
        let result = policy
            .execute(&context, |_attempt| {
                let upstream = Arc::clone(&upstream);
                let request = Arc::clone(&request);
                async move { upstream.complete(&request).await }
            })
            .await;

        match result {
            Ok(response) => {
                if let Some(key) = key {
                    self.cache.insert(key, response.clone(), options.cache_ttl);
                }
                self.stats.record_success(started.elapsed(), &response.usage);
                self.notify_tokens(options.session_id.as_deref(), &response.usage)
                    .await;
                Ok(response)
            }
            Err(err) => {
                self.stats.record_failure();
                self.notify_overflow(&options, &err).await;
                Err(err)
            }
        }
    }

    /// Send a message list and stream the response
    ///
    /// The yielded event sequence is identical whether served from cache or
    /// live: content chunks, a usage update, then a completion event. The
    /// stream is lazy and consumer-paced; dropping it before completion
    /// abandons the upstream stream and writes no cache entry.
    ///
    /// # Errors
    /// Returns the `ClassifiedError` when the stream cannot be established
    #[instrument(skip(self, messages, options), fields(model = %options.model))]
    pub async fn send_message_stream(
        &self,
        messages: Vec<ChatMessage>,
        options: RequestOptions,
    ) -> Result<EventStream, ClassifiedError> {
        let started = Instant::now();
        let context = self.error_context("send_message_stream", &options);

        let request = match self.build_request(&messages, &options) {
            Ok(request) => request,
            Err(err) => return Err(self.classifier.classify(err.to_string(), context)),
        };

        let key = self.cache_key(&messages, &options);
        if let Some(key) = &key {
            if let Some(response) = self.cache.get(key) {
                debug!(fingerprint = %key.fingerprint(), "Replaying response from cache");
                self.stats.record_cache_hit();
                self.notify_tokens(options.session_id.as_deref(), &response.usage)
                    .await;
                return Ok(self.replay_stream(response));
            }
        }

        let policy = self.retry_policy(&options);
        let upstream = Arc::clone(&self.upstream);
        let request = Arc::new(request);
        let established = policy
            .execute(&context, |_attempt| {
                let upstream = Arc::clone(&upstream);
                let request = Arc::clone(&request);
                async move { upstream.complete_stream(&request).await }
            })
            .await;

        match established {
            Ok(upstream_stream) => {
                Ok(self.relay_stream(upstream_stream, key, &options, context, started))
            }
            Err(err) => {
                self.stats.record_failure();
                self.notify_overflow(&options, &err).await;
                Err(err)
            }
        }
    }

    /// Synthesize a stream from a cached complete response
    fn replay_stream(&self, response: ChatResponse) -> EventStream {
        let chunk_chars = self.stream_settings.replay_chunk_chars;
        let delay = self.stream_settings.replay_delay;

        let stream = stream! {
            let chunks = chunk_text(&response.content, chunk_chars);
            let total = chunks.len();
            for (index, chunk) in chunks.into_iter().enumerate() {
                yield Ok(StreamEvent::Content(chunk));
                if index + 1 < total && !delay.is_zero() {
                    // Cosmetic pacing only; correctness never depends on it.
                    tokio::time::sleep(delay).await;
                }
            }
            yield Ok(StreamEvent::Usage(response.usage));
            yield Ok(StreamEvent::Completed(response));
        };
        Box::pin(stream)
    }

    /// Relay a live upstream stream, caching the assembled result on completion
    fn relay_stream(
        &self,
        mut upstream: relay_core::UpstreamStream,
        key: Option<CacheKey>,
        options: &RequestOptions,
        context: ErrorContext,
        started: Instant,
    ) -> EventStream {
        let cache = Arc::clone(&self.cache);
        let stats = Arc::clone(&self.stats);
        let observer = Arc::clone(&self.observer);
        let classifier = Arc::clone(&self.classifier);
        let model = options.model.clone();
        let session_id = options.session_id.clone();
        let cache_ttl = options.cache_ttl;

        let stream = try_stream! {
            let mut content = String::new();
            let mut usage = Usage::default();
            let mut finish_reason = None;

            while let Some(item) = upstream.next().await {
                match item {
                    Ok(chunk) => {
                        if let Some(text) = chunk.content {
                            content.push_str(&text);
                            yield StreamEvent::Content(text);
                        }
                        if let Some(chunk_usage) = chunk.usage {
                            usage = chunk_usage;
                            yield StreamEvent::Usage(chunk_usage);
                        }
                        if let Some(reason) = chunk.finish_reason {
                            finish_reason = Some(reason);
                        }
                    }
                    Err(err) => {
                        let classified = classifier.classify(err, context.clone());
                        stats.record_failure();
                        warn!(code = classified.code, "Upstream stream failed mid-flight");
                        Err(classified)?;
                    }
                }
            }

            let response = ChatResponse::builder()
                .model(model.clone())
                .content(content)
                .usage(usage)
                .finish_reason(finish_reason.unwrap_or(FinishReason::Stop))
                .build();

            // Only a fully relayed stream reaches this point; a dropped
            // consumer abandons the upstream stream and caches nothing.
            if let Some(key) = key {
                cache.insert(key, response.clone(), cache_ttl);
            }
            stats.record_success(started.elapsed(), &response.usage);
            if let Some(session_id) = session_id.as_deref() {
                if let Err(err) = observer.on_tokens(session_id, &response.usage).await {
                    warn!(session_id, error = %err, "Session token notification failed");
                }
            }

            yield StreamEvent::Completed(response);
        };
        Box::pin(stream)
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        options: &RequestOptions,
    ) -> Result<ChatRequest, relay_core::ValidationError> {
        let mut builder = ChatRequest::builder()
            .model(options.model.clone())
            .messages(messages.to_vec());
        if let Some(temperature) = options.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(max_tokens) = options.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }
        if let Some(prompt) = &options.system_prompt {
            builder = builder.system_prompt(prompt.clone());
        }
        builder.build()
    }

    fn cache_key(&self, messages: &[ChatMessage], options: &RequestOptions) -> Option<CacheKey> {
        (options.use_cache && self.cache.is_enabled()).then(|| {
            CacheKey::compute(
                messages,
                &options.model,
                options.temperature,
                options.system_prompt.as_deref(),
                options.max_tokens,
            )
        })
    }

    fn retry_policy(&self, options: &RequestOptions) -> RetryPolicy {
        let config = if options.auto_retry && self.retry_enabled {
            match options.retry {
                Some(retry) => RetryConfig {
                    max_retries: retry.max_retries,
                    base_delay: retry.base_delay,
                    max_jitter: self.retry_defaults.max_jitter,
                },
                None => self.retry_defaults,
            }
        } else {
            RetryConfig::no_retries()
        };
        RetryPolicy::new(config, Arc::clone(&self.classifier))
    }

    fn error_context(&self, operation: &str, options: &RequestOptions) -> ErrorContext {
        let mut context = ErrorContext::new(operation).with_model(options.model.clone());
        if let Some(session_id) = &options.session_id {
            context = context.with_session_id(session_id.clone());
        }
        if let Some(path) = &options.project_path {
            context = context.with_project_path(path.display().to_string());
        }
        context
    }

    async fn notify_tokens(&self, session_id: Option<&str>, usage: &Usage) {
        let Some(session_id) = session_id else {
            return;
        };
        if let Err(err) = self.observer.on_tokens(session_id, usage).await {
            warn!(session_id, error = %err, "Session token notification failed");
        }
    }

    async fn notify_overflow(&self, options: &RequestOptions, err: &ClassifiedError) {
        if err.category != ErrorCategory::ApiContextTooLong || !err.recoverable {
            return;
        }
        let Some(session_id) = options.session_id.as_deref() else {
            return;
        };
        if let Err(err) = self.observer.on_context_overflow(session_id).await {
            warn!(session_id, error = %err, "Context overflow notification failed");
        }
    }

    /// Snapshot of the aggregate service statistics
    #[must_use]
    pub fn stats(&self) -> ServiceStats {
        self.stats.snapshot(&self.cache.stats())
    }

    /// Snapshot of the cache's own statistics
    #[must_use]
    pub fn cache_analytics(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The most frequently served cached requests
    #[must_use]
    pub fn popular_patterns(&self, limit: usize) -> Vec<CachePattern> {
        self.cache.popular_patterns(limit)
    }

    /// The most recent classified errors, newest first
    #[must_use]
    pub fn recent_errors(&self, n: usize) -> Vec<ClassifiedError> {
        self.classifier.recent(n)
    }

    /// Roll-up of the classifier's error history
    #[must_use]
    pub fn error_stats(&self) -> ErrorHistoryStats {
        self.classifier.history_stats()
    }

    /// Discard the classifier's error history
    pub fn clear_error_history(&self) {
        self.classifier.clear_history();
    }

    /// Clear the cache and zero all counters
    pub fn reset(&self) {
        self.cache.clear();
        self.stats.reset();
    }
}

impl Drop for RequestService {
    fn drop(&mut self) {
        if let Some(sweeper) = &self.sweeper {
            sweeper.abort();
        }
    }
}

/// Builder for `RequestService`
pub struct RequestServiceBuilder {
    upstream: Arc<dyn UpstreamClient>,
    observer: Arc<dyn SessionObserver>,
    cache_config: CacheConfig,
    retry_config: RetryConfig,
    retry_enabled: bool,
    stream_settings: StreamSettings,
}

impl RequestServiceBuilder {
    /// Create a builder with default configuration
    #[must_use]
    pub fn new(upstream: Arc<dyn UpstreamClient>) -> Self {
        Self {
            upstream,
            observer: Arc::new(NoopObserver),
            cache_config: CacheConfig::default(),
            retry_config: RetryConfig::default(),
            retry_enabled: true,
            stream_settings: StreamSettings::default(),
        }
    }

    /// Inject a session observer
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Set the cache configuration
    #[must_use]
    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Set the default retry configuration
    #[must_use]
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Globally enable or disable automatic retries
    #[must_use]
    pub fn retry_enabled(mut self, enabled: bool) -> Self {
        self.retry_enabled = enabled;
        self
    }

    /// Set the stream replay settings
    #[must_use]
    pub fn stream_settings(mut self, settings: StreamSettings) -> Self {
        self.stream_settings = settings;
        self
    }

    /// Build the service
    ///
    /// Spawns the cache sweeper when called inside a tokio runtime.
    #[must_use]
    pub fn build(self) -> RequestService {
        let cache = Arc::new(ResponseCache::new(self.cache_config));
        let sweeper = if cache.is_enabled() && tokio::runtime::Handle::try_current().is_ok() {
            Some(cache.start_sweeper())
        } else {
            None
        };

        RequestService {
            upstream: self.upstream,
            classifier: Arc::new(ErrorClassifier::new()),
            cache,
            stats: Arc::new(StatsRecorder::new()),
            observer: self.observer,
            retry_defaults: self.retry_config,
            retry_enabled: self.retry_enabled,
            stream_settings: self.stream_settings,
            sweeper,
        }
    }
}

/// Slice text into fixed-size character chunks, respecting UTF-8 boundaries
fn chunk_text(text: &str, chunk_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_chars.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}
