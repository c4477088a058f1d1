//! Retry with exponential backoff and jitter.
//!
//! The policy executes an operation and consults the error classifier on
//! every failure: retryable classifications sleep and try again up to the
//! budget, everything else surfaces immediately as a `ClassifiedError`.

use crate::classify::{ClassifiedError, ErrorClassifier, ErrorContext, Failure};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy configuration
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum retries after the first attempt
    pub max_retries: u32,
    /// Base delay, doubled on each attempt
    pub base_delay: Duration,
    /// Upper bound of the uniform jitter added to each delay
    pub max_jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_millis(1000),
        }
    }
}

impl RetryConfig {
    /// A policy that never retries; failures are still classified
    #[must_use]
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Executes operations under a retry budget
pub struct RetryPolicy {
    config: RetryConfig,
    classifier: Arc<ErrorClassifier>,
}

impl RetryPolicy {
    /// Create a policy with the given configuration
    #[must_use]
    pub fn new(config: RetryConfig, classifier: Arc<ErrorClassifier>) -> Self {
        Self { config, classifier }
    }

    /// The configured retry budget
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute `operation`, retrying retryable failures with backoff
    ///
    /// The operation receives the zero-based attempt number. The loop is
    /// iterative; stack depth does not grow with `max_retries`.
    ///
    /// # Errors
    /// Returns the last `ClassifiedError` when the budget is exhausted or a
    /// failure is classified as non-retryable
    pub async fn execute<T, E, F, Fut>(
        &self,
        context: &ErrorContext,
        mut operation: F,
    ) -> Result<T, ClassifiedError>
    where
        E: Into<Failure>,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation = %context.operation,
                            attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let classified = self
                        .classifier
                        .classify(err, context.clone().with_attempt(attempt));

                    if attempt >= self.config.max_retries || !classified.retryable {
                        return Err(classified);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = %context.operation,
                        code = classified.code,
                        attempt,
                        delay_ms = delay.as_millis(),
                        "Retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Backoff delay for the given attempt: `base * 2^attempt + jitter`
    fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .config
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        let jitter_ms = self.config.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
        };
        exponential + jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::UpstreamError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(
            RetryConfig {
                max_retries,
                base_delay: Duration::from_secs(1),
                max_jitter: Duration::from_millis(1000),
            },
            Arc::new(ErrorClassifier::new()),
        )
    }

    fn ctx() -> ErrorContext {
        ErrorContext::new("test_op")
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, ClassifiedError> = policy(3)
            .execute(&ctx(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, UpstreamError>(42) }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = policy(2)
            .execute(&ctx(), |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(UpstreamError::api(429, "rate limited"))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = policy(3)
            .execute(&ctx(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(UpstreamError::api(401, "bad key")) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.code, "AUTH_INVALID_API_KEY");
        assert!(err.recoverable);
        assert!(!err.retryable);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_surfaces_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = policy(2)
            .execute(&ctx(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(UpstreamError::api(503, "overloaded")) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.code, "API_OVERLOADED");
        assert_eq!(err.context.attempt, 2);
        // maxRetries=2 means exactly 3 invocations.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_grow_exponentially() {
        let started = Instant::now();
        let calls = AtomicU32::new(0);
        let _ = policy(2)
            .execute(&ctx(), |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(UpstreamError::api(429, "rate limited"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        // Delays: [1000, 2000) then [2000, 3000) ms.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(3000), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(5000), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retry_policy_classifies_single_failure() {
        let policy = RetryPolicy::new(
            RetryConfig::no_retries(),
            Arc::new(ErrorClassifier::new()),
        );
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = policy
            .execute(&ctx(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(UpstreamError::api(503, "overloaded")) }
            })
            .await;

        assert_eq!(result.unwrap_err().code, "API_OVERLOADED");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
