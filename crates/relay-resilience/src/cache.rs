//! Content-addressed response caching.
//!
//! Maps a fingerprint of a request's semantically relevant fields to a
//! previously produced response, so identical requests skip the upstream
//! call entirely. Tracks hit/miss statistics and the token cost avoided.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use relay_core::{ChatMessage, ChatResponse};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether caching is enabled
    pub enabled: bool,
    /// Maximum number of entries before oldest-created eviction
    pub max_entries: usize,
    /// Default TTL for entries without an explicit override
    pub default_ttl: Duration,
    /// Interval for the periodic expired-entry sweep
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 500,
            default_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

/// Fingerprint of a request's cache-relevant fields
///
/// Temperature is quantized to two decimal places before hashing so that
/// representation noise (0.7 vs 0.70000001) cannot cause false misses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Model the fingerprint was computed for
    model: String,
    /// SHA-256 digest over the remaining fields
    digest: [u8; 32],
}

impl CacheKey {
    /// Compute the fingerprint for a request
    #[must_use]
    pub fn compute(
        messages: &[ChatMessage],
        model: &str,
        temperature: Option<f32>,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
    ) -> Self {
        let mut hasher = Sha256::new();

        // Length-prefix every variable field so adjacent fields cannot
        // alias each other in the digest input.
        update_str(&mut hasher, model);
        hasher.update((messages.len() as u64).to_le_bytes());
        for message in messages {
            update_str(&mut hasher, message.role.as_str());
            update_str(&mut hasher, &message.content);
        }
        hasher.update(quantize_temperature(temperature).to_le_bytes());
        match system_prompt {
            Some(prompt) => {
                hasher.update([1u8]);
                update_str(&mut hasher, prompt);
            }
            None => hasher.update([0u8]),
        }
        match max_tokens {
            Some(tokens) => {
                hasher.update([1u8]);
                hasher.update(tokens.to_le_bytes());
            }
            None => hasher.update([0u8]),
        }

        Self {
            model: model.to_string(),
            digest: hasher.finalize().into(),
        }
    }

    /// Model this key was computed for
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Short hex form of the digest, for logs and analytics
    #[must_use]
    pub fn fingerprint(&self) -> String {
        self.digest[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

fn update_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

/// Quantize temperature to two decimal places (absent = sentinel)
fn quantize_temperature(temperature: Option<f32>) -> i64 {
    match temperature {
        Some(t) => (f64::from(t) * 100.0).round() as i64,
        None => i64::MIN,
    }
}

/// A cached response entry
#[derive(Debug, Clone)]
struct CacheEntry {
    response: ChatResponse,
    created: Instant,
    created_at: DateTime<Utc>,
    /// Insertion order; breaks `created` ties during eviction
    seq: u64,
    ttl: Option<Duration>,
    hit_count: u64,
}

impl CacheEntry {
    fn new(response: ChatResponse, ttl: Option<Duration>, seq: u64) -> Self {
        Self {
            response,
            created: Instant::now(),
            created_at: Utc::now(),
            seq,
            ttl,
            hit_count: 0,
        }
    }

    /// An entry exactly at its expiry instant is already expired
    fn is_expired(&self) -> bool {
        self.ttl.is_some_and(|ttl| self.created.elapsed() >= ttl)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Current number of entries
    pub entries: usize,
    /// Entries removed by expiry or capacity eviction
    pub evictions: u64,
    /// Upstream tokens avoided by serving hits
    pub total_tokens_saved: u64,
}

impl CacheStats {
    /// Hit rate in `[0, 1]`
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A frequently-hit cached request, for analytics
#[derive(Debug, Clone)]
pub struct CachePattern {
    /// Model the entry belongs to
    pub model: String,
    /// Short fingerprint of the key
    pub fingerprint: String,
    /// Times the entry was served
    pub hits: u64,
    /// When the entry was created
    pub created_at: DateTime<Utc>,
}

/// Content-addressed response cache
pub struct ResponseCache {
    config: CacheConfig,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    stats: RwLock<CacheStats>,
    next_seq: AtomicU64,
}

impl ResponseCache {
    /// Create a new cache
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Check if caching is enabled
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// The configured default TTL
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl
    }

    /// Look up a response
    ///
    /// Expired entries are purged and counted as misses. A hit increments
    /// the entry's hit count and accrues the response's input and output
    /// tokens as savings.
    pub fn get(&self, key: &CacheKey) -> Option<ChatResponse> {
        if !self.config.enabled {
            return None;
        }

        let mut entries = self.entries.write();
        let mut stats = self.stats.write();

        match entries.get_mut(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                stats.misses += 1;
                stats.evictions += 1;
                stats.entries = entries.len();
                debug!(model = key.model(), fingerprint = %key.fingerprint(), "Cache miss (expired)");
                None
            }
            Some(entry) => {
                entry.hit_count += 1;
                stats.hits += 1;
                stats.total_tokens_saved += entry.response.usage.total();
                debug!(
                    model = key.model(),
                    fingerprint = %key.fingerprint(),
                    hits = entry.hit_count,
                    "Cache hit"
                );
                Some(entry.response.clone())
            }
            None => {
                stats.misses += 1;
                debug!(model = key.model(), fingerprint = %key.fingerprint(), "Cache miss");
                None
            }
        }
    }

    /// Install a response under the key, overwriting any prior entry
    ///
    /// `ttl` overrides the configured default; entries never outlive the
    /// capacity bound, which evicts expired entries first and then the
    /// oldest-created.
    pub fn insert(&self, key: CacheKey, response: ChatResponse, ttl: Option<Duration>) {
        if !self.config.enabled {
            return;
        }

        let mut entries = self.entries.write();
        let mut stats = self.stats.write();

        if !entries.contains_key(&key) && entries.len() >= self.config.max_entries {
            Self::evict(&mut entries, &mut stats, self.config.max_entries);
        }

        let ttl = ttl.or(Some(self.config.default_ttl));
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        entries.insert(key, CacheEntry::new(response, ttl, seq));
        stats.entries = entries.len();
    }

    /// Evict until there is room for one more entry
    fn evict(entries: &mut HashMap<CacheKey, CacheEntry>, stats: &mut CacheStats, cap: usize) {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());

        while entries.len() >= cap {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| (entry.created, entry.seq))
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    entries.remove(&key);
                }
                None => break,
            }
        }

        let removed = before - entries.len();
        stats.evictions += removed as u64;
        if removed > 0 {
            info!(removed, "Cache eviction completed");
        }
    }

    /// Remove all entries
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        let mut stats = self.stats.write();
        entries.clear();
        stats.entries = 0;
        info!("Cache cleared");
    }

    /// Remove expired entries
    pub fn cleanup_expired(&self) {
        let mut entries = self.entries.write();
        let mut stats = self.stats.write();

        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        let removed = before - entries.len();

        stats.entries = entries.len();
        stats.evictions += removed as u64;

        if removed > 0 {
            debug!(removed, "Expired cache entries removed");
        }
    }

    /// Spawn a background task sweeping expired entries on an interval
    #[must_use]
    pub fn start_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let mut ticker = tokio::time::interval(cache.config.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::spawn(async move {
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.cleanup_expired();
            }
        })
    }

    /// Snapshot of the cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    /// The most frequently served entries, descending by hit count
    #[must_use]
    pub fn popular_patterns(&self, limit: usize) -> Vec<CachePattern> {
        let entries = self.entries.read();
        let mut patterns: Vec<CachePattern> = entries
            .iter()
            .filter(|(_, entry)| entry.hit_count > 0)
            .map(|(key, entry)| CachePattern {
                model: key.model().to_string(),
                fingerprint: key.fingerprint(),
                hits: entry.hit_count,
                created_at: entry.created_at,
            })
            .collect();
        patterns.sort_by(|a, b| b.hits.cmp(&a.hits));
        patterns.truncate(limit);
        patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{FinishReason, Usage};

    fn make_key(content: &str) -> CacheKey {
        CacheKey::compute(
            &[ChatMessage::user(content)],
            "claude-3-haiku-20240307",
            Some(0.7),
            None,
            Some(1024),
        )
    }

    fn make_response(content: &str) -> ChatResponse {
        ChatResponse::builder()
            .model("claude-3-haiku-20240307")
            .content(content)
            .usage(Usage::new(10, 20))
            .finish_reason(FinishReason::Stop)
            .build()
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = ResponseCache::with_defaults();
        let key = make_key("Hello");

        assert!(cache.get(&key).is_none());
        cache.insert(key.clone(), make_response("Hi!"), None);

        let cached = cache.get(&key).expect("hit");
        assert_eq!(cached.content, "Hi!");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_key_distinguishes_content_and_model() {
        let base = make_key("Hello");
        assert_ne!(base, make_key("Goodbye"));

        let other_model = CacheKey::compute(
            &[ChatMessage::user("Hello")],
            "claude-3-opus-20240229",
            Some(0.7),
            None,
            Some(1024),
        );
        assert_ne!(base, other_model);
    }

    #[test]
    fn test_key_distinguishes_system_prompt_and_max_tokens() {
        let messages = [ChatMessage::user("Hello")];
        let model = "claude-3-haiku-20240307";

        let plain = CacheKey::compute(&messages, model, Some(0.7), None, None);
        let with_system = CacheKey::compute(&messages, model, Some(0.7), Some("Be brief"), None);
        let with_budget = CacheKey::compute(&messages, model, Some(0.7), None, Some(512));

        assert_ne!(plain, with_system);
        assert_ne!(plain, with_budget);
        assert_ne!(with_system, with_budget);
    }

    #[test]
    fn test_temperature_quantization() {
        let messages = [ChatMessage::user("Hello")];
        let model = "claude-3-haiku-20240307";

        let a = CacheKey::compute(&messages, model, Some(0.7), None, None);
        let b = CacheKey::compute(&messages, model, Some(0.700_000_01), None, None);
        let c = CacheKey::compute(&messages, model, Some(0.71), None, None);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_absent_temperature_is_its_own_bucket() {
        let messages = [ChatMessage::user("Hello")];
        let model = "claude-3-haiku-20240307";

        let unset = CacheKey::compute(&messages, model, None, None, None);
        let zero = CacheKey::compute(&messages, model, Some(0.0), None, None);
        assert_ne!(unset, zero);
    }

    #[test]
    fn test_entry_at_expiry_is_a_miss() {
        let cache = ResponseCache::with_defaults();
        let key = make_key("Hello");

        // Zero TTL: elapsed() >= ttl holds immediately.
        cache.insert(key.clone(), make_response("Hi!"), Some(Duration::ZERO));

        assert!(cache.get(&key).is_none());
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.evictions, 1);
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let cache = ResponseCache::with_defaults();
        let key = make_key("Hello");

        let mut entries = cache.entries.write();
        entries.insert(
            key.clone(),
            CacheEntry {
                response: make_response("Hi!"),
                created: Instant::now()
                    .checked_sub(Duration::from_secs(86_400))
                    .unwrap_or_else(Instant::now),
                created_at: Utc::now(),
                seq: 0,
                ttl: None,
                hit_count: 0,
            },
        );
        drop(entries);

        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn test_tokens_saved_accrue_on_hits() {
        let cache = ResponseCache::with_defaults();
        let key = make_key("Hello");
        cache.insert(key.clone(), make_response("Hi!"), None);

        cache.get(&key);
        cache.get(&key);

        assert_eq!(cache.stats().total_tokens_saved, 60);
    }

    #[test]
    fn test_overwrite_same_key() {
        let cache = ResponseCache::with_defaults();
        let key = make_key("Hello");

        cache.insert(key.clone(), make_response("first"), None);
        cache.insert(key.clone(), make_response("second"), None);

        assert_eq!(cache.get(&key).unwrap().content, "second");
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn test_capacity_evicts_oldest_created() {
        let cache = ResponseCache::new(CacheConfig {
            max_entries: 2,
            ..CacheConfig::default()
        });

        let first = make_key("first");
        let second = make_key("second");
        let third = make_key("third");

        cache.insert(first.clone(), make_response("1"), None);
        cache.insert(second.clone(), make_response("2"), None);
        cache.insert(third.clone(), make_response("3"), None);

        assert!(cache.get(&first).is_none());
        assert!(cache.get(&second).is_some());
        assert!(cache.get(&third).is_some());
        assert_eq!(cache.stats().entries, 2);
    }

    #[test]
    fn test_cleanup_expired_sweep() {
        let cache = ResponseCache::with_defaults();
        cache.insert(make_key("keep"), make_response("1"), None);
        cache.insert(make_key("drop"), make_response("2"), Some(Duration::ZERO));

        cache.cleanup_expired();

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.evictions, 1);
    }

    #[test]
    fn test_clear() {
        let cache = ResponseCache::with_defaults();
        let key = make_key("Hello");
        cache.insert(key.clone(), make_response("Hi!"), None);

        cache.clear();
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_disabled_cache_never_serves() {
        let cache = ResponseCache::new(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        });
        let key = make_key("Hello");

        cache.insert(key.clone(), make_response("Hi!"), None);
        assert!(cache.get(&key).is_none());
        assert!(!cache.is_enabled());
    }

    #[test]
    fn test_popular_patterns() {
        let cache = ResponseCache::with_defaults();
        let hot = make_key("hot");
        let warm = make_key("warm");
        let cold = make_key("cold");

        cache.insert(hot.clone(), make_response("h"), None);
        cache.insert(warm.clone(), make_response("w"), None);
        cache.insert(cold, make_response("c"), None);

        for _ in 0..3 {
            cache.get(&hot);
        }
        cache.get(&warm);

        let patterns = cache.popular_patterns(10);
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0].hits, 3);
        assert_eq!(patterns[1].hits, 1);

        let limited = cache.popular_patterns(1);
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_entries() {
        let cache = Arc::new(ResponseCache::new(CacheConfig {
            sweep_interval: Duration::from_millis(100),
            ..CacheConfig::default()
        }));
        cache.insert(make_key("drop"), make_response("1"), Some(Duration::ZERO));

        let handle = cache.start_sweeper();
        tokio::time::sleep(Duration::from_millis(250)).await;
        handle.abort();

        assert_eq!(cache.stats().entries, 0);
    }
}
