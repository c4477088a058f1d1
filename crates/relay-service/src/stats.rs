//! Aggregate service statistics.
//!
//! Counters are mutated only by the orchestrator at well-defined completion
//! points (cache hit, success, failure), exactly once per logical request,
//! and are monotonically non-decreasing except on an explicit reset.

use parking_lot::Mutex;
use relay_core::Usage;
use relay_resilience::CacheStats;
use std::time::Duration;

/// Snapshot of the service's aggregate statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceStats {
    /// Logical requests that reached a completion point
    pub total_requests: u64,
    /// Requests that completed successfully (cached or live)
    pub successful: u64,
    /// Requests that surfaced a classified failure
    pub failed: u64,
    /// Requests served from the cache
    pub cached: u64,
    /// Mean latency of live network successes, in milliseconds
    pub average_response_time_ms: f64,
    /// Tokens processed by live upstream calls
    pub total_tokens_processed: u64,
    /// Tokens avoided by serving cache hits
    pub total_tokens_saved: u64,
    /// Cache hit rate in `[0, 1]`
    pub cache_hit_rate: f64,
}

#[derive(Debug, Default)]
struct StatsInner {
    total_requests: u64,
    successful: u64,
    failed: u64,
    cached: u64,
    total_tokens_processed: u64,
    live_successes: u64,
    live_success_time: Duration,
}

/// Records completion-point statistics for the orchestrator
#[derive(Debug, Default)]
pub struct StatsRecorder {
    inner: Mutex<StatsInner>,
}

impl StatsRecorder {
    /// Create a zeroed recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A request was served from the cache
    pub fn record_cache_hit(&self) {
        let mut inner = self.inner.lock();
        inner.total_requests += 1;
        inner.successful += 1;
        inner.cached += 1;
    }

    /// A live upstream call completed successfully
    pub fn record_success(&self, elapsed: Duration, usage: &Usage) {
        let mut inner = self.inner.lock();
        inner.total_requests += 1;
        inner.successful += 1;
        inner.total_tokens_processed += usage.total();
        inner.live_successes += 1;
        inner.live_success_time += elapsed;
    }

    /// A request failed after exhausting its options
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.total_requests += 1;
        inner.failed += 1;
    }

    /// Zero all counters
    pub fn reset(&self) {
        *self.inner.lock() = StatsInner::default();
    }

    /// Snapshot joined with the cache's own statistics
    #[must_use]
    pub fn snapshot(&self, cache: &CacheStats) -> ServiceStats {
        let inner = self.inner.lock();
        let average_response_time_ms = if inner.live_successes == 0 {
            0.0
        } else {
            inner.live_success_time.as_secs_f64() * 1000.0 / inner.live_successes as f64
        };

        ServiceStats {
            total_requests: inner.total_requests,
            successful: inner.successful,
            failed: inner.failed,
            cached: inner.cached,
            average_response_time_ms,
            total_tokens_processed: inner.total_tokens_processed,
            total_tokens_saved: cache.total_tokens_saved,
            cache_hit_rate: cache.hit_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_points() {
        let recorder = StatsRecorder::new();
        recorder.record_success(Duration::from_millis(200), &Usage::new(100, 50));
        recorder.record_success(Duration::from_millis(400), &Usage::new(10, 5));
        recorder.record_cache_hit();
        recorder.record_failure();

        let stats = recorder.snapshot(&CacheStats::default());
        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.successful, 3);
        assert_eq!(stats.cached, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total_tokens_processed, 165);
        assert!((stats.average_response_time_ms - 300.0).abs() < 1e-6);
    }

    #[test]
    fn test_cache_join() {
        let recorder = StatsRecorder::new();
        let cache = CacheStats {
            hits: 3,
            misses: 1,
            total_tokens_saved: 420,
            ..CacheStats::default()
        };

        let stats = recorder.snapshot(&cache);
        assert_eq!(stats.total_tokens_saved, 420);
        assert!((stats.cache_hit_rate - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_reset() {
        let recorder = StatsRecorder::new();
        recorder.record_failure();
        recorder.reset();

        let stats = recorder.snapshot(&CacheStats::default());
        assert_eq!(stats, ServiceStats::default());
    }
}
