//! Rate limiting and adaptive throttling for the Evernote NoteStore/UserStore
//! wire endpoints.
//!
//! - [`TokenBucket`]: classic token bucket, per endpoint.
//! - [`AdaptiveRateLimiter`]: manages one bucket per endpoint, adapting
//!   capacity based on server responses (rate-limit / success).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

#[derive(Debug)]
struct TokenBucketInner {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter for a single endpoint. Thread-safe via an
/// internal `Mutex`.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    effective_capacity: Mutex<u32>,
    refill_rate: f64,
    inner: Mutex<TokenBucketInner>,
    success_count: Mutex<u64>,
    original_capacity: u32,
}

impl TokenBucket {
    /// Starts full (tokens == capacity).
    #[must_use]
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            effective_capacity: Mutex::new(capacity),
            refill_rate,
            inner: Mutex::new(TokenBucketInner {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
            success_count: Mutex::new(0),
            original_capacity: capacity,
        }
    }

    fn refill(inner: &mut TokenBucketInner, refill_rate: f64, effective_capacity: u32) {
        let now = Instant::now();
        let elapsed_secs = now.duration_since(inner.last_refill).as_secs_f64();
        if elapsed_secs > 0.0 {
            let new_tokens = elapsed_secs * refill_rate;
            inner.tokens = (inner.tokens + new_tokens).min(effective_capacity as f64);
            inner.last_refill = now;
        }
    }

    pub fn try_acquire(&self) -> bool {
        let effective_cap = *self.effective_capacity.lock().unwrap();
        let mut inner = self.inner.lock().unwrap();
        Self::refill(&mut inner, self.refill_rate, effective_cap);
        if inner.tokens >= 1.0 {
            inner.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn time_until_available(&self) -> f64 {
        let effective_cap = *self.effective_capacity.lock().unwrap();
        let mut inner = self.inner.lock().unwrap();
        Self::refill(&mut inner, self.refill_rate, effective_cap);
        if inner.tokens >= 1.0 {
            0.0
        } else if self.refill_rate > 0.0 {
            (1.0 - inner.tokens) / self.refill_rate
        } else {
            f64::MAX
        }
    }

    #[must_use]
    pub fn available_tokens(&self) -> f64 {
        let effective_cap = *self.effective_capacity.lock().unwrap();
        let mut inner = self.inner.lock().unwrap();
        Self::refill(&mut inner, self.refill_rate, effective_cap);
        inner.tokens
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[must_use]
    pub fn effective_capacity(&self) -> u32 {
        *self.effective_capacity.lock().unwrap()
    }

    /// Every 100 consecutive successes, effective capacity grows 5% toward
    /// the original capacity.
    pub fn on_success(&self) {
        let mut count = self.success_count.lock().unwrap();
        *count += 1;
        if *count % 100 == 0 {
            let mut eff_cap = self.effective_capacity.lock().unwrap();
            if *eff_cap < self.original_capacity {
                let increase = (*eff_cap as f64 * 0.05).max(1.0) as u32;
                let new_cap = (*eff_cap + increase).min(self.original_capacity);
                debug!(old_capacity = *eff_cap, new_cap, "adaptive recovery: raising bucket capacity");
                *eff_cap = new_cap;
            }
        }
    }

    /// Halves effective capacity (floor 1) and resets the success streak.
    pub fn on_throttle(&self) {
        let mut eff_cap = self.effective_capacity.lock().unwrap();
        let old = *eff_cap;
        *eff_cap = (*eff_cap / 2).max(1);
        warn!(old_capacity = old, new_capacity = *eff_cap, "rate limit reached, halving bucket capacity");
        *self.success_count.lock().unwrap() = 0;
    }
}

/// Marker returned once a token has been acquired.
#[derive(Debug)]
pub struct RateLimitGuard {
    _endpoint: String,
}

impl RateLimitGuard {
    fn new(endpoint: String) -> Self {
        Self { _endpoint: endpoint }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub default_capacity: u32,
    pub default_refill_rate: f64,
    pub endpoint_overrides: HashMap<String, (u32, f64)>,
    pub max_retries: u32,
}

impl Default for RateLimitConfig {
    /// Evernote's published per-user limits are much looser than Graph's; we
    /// still start conservatively and let adaptive throttling widen it.
    fn default() -> Self {
        let mut overrides = HashMap::new();
        overrides.insert("get_sync_chunk".to_string(), (30, 1.0));
        overrides.insert("get_note".to_string(), (100, 5.0));
        overrides.insert("get_resource".to_string(), (100, 5.0));
        overrides.insert("write".to_string(), (60, 2.0));

        Self {
            default_capacity: 120,
            default_refill_rate: 4.0,
            endpoint_overrides: overrides,
            max_retries: 3,
        }
    }
}

/// Manages one token bucket per endpoint name. Share via `Arc`.
pub struct AdaptiveRateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    config: RateLimitConfig,
}

impl std::fmt::Debug for AdaptiveRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveRateLimiter").field("config", &self.config).finish()
    }
}

impl AdaptiveRateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            config,
        }
    }

    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    fn get_or_create_bucket<F, R>(&self, endpoint: &str, f: F) -> R
    where
        F: FnOnce(&TokenBucket) -> R,
    {
        let mut buckets = self.buckets.lock().unwrap();
        if !buckets.contains_key(endpoint) {
            let (capacity, refill_rate) = self
                .config
                .endpoint_overrides
                .get(endpoint)
                .copied()
                .unwrap_or((self.config.default_capacity, self.config.default_refill_rate));
            buckets.insert(endpoint.to_string(), TokenBucket::new(capacity, refill_rate));
        }
        f(buckets.get(endpoint).unwrap())
    }

    /// Blocks (by sleeping, not spinning) until a token is available.
    pub async fn acquire(&self, endpoint: &str) -> RateLimitGuard {
        loop {
            if self.get_or_create_bucket(endpoint, TokenBucket::try_acquire) {
                return RateLimitGuard::new(endpoint.to_string());
            }
            let wait_secs = self.get_or_create_bucket(endpoint, TokenBucket::time_until_available);
            tokio::time::sleep(Duration::from_secs_f64(wait_secs.max(0.01))).await;
        }
    }

    pub fn on_success(&self, endpoint: &str) {
        self.get_or_create_bucket(endpoint, TokenBucket::on_success);
    }

    pub fn on_throttle(&self, endpoint: &str) {
        info!(endpoint, "recording rate-limit event");
        self.get_or_create_bucket(endpoint, TokenBucket::on_throttle);
    }

    #[must_use]
    pub fn available_tokens(&self, endpoint: &str) -> Option<f64> {
        self.buckets.lock().unwrap().get(endpoint).map(TokenBucket::available_tokens)
    }

    #[must_use]
    pub fn effective_capacity(&self, endpoint: &str) -> Option<u32> {
        self.buckets.lock().unwrap().get(endpoint).map(TokenBucket::effective_capacity)
    }
}

/// Parses an Evernote `StopSynchronizationError::RateLimitReached`'s
/// `seconds_to_wait` (or a transport-level `Retry-After` header) into a
/// `Duration`, falling back to `default` when absent or unparseable.
#[must_use]
pub fn parse_retry_after(value: Option<i32>, default: Duration) -> Duration {
    match value {
        Some(seconds) if seconds > 0 => Duration::from_secs(seconds as u64),
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_starts_full_and_drains() {
        let bucket = TokenBucket::new(2, 1.0);
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn on_throttle_halves_capacity() {
        let bucket = TokenBucket::new(10, 1.0);
        bucket.on_throttle();
        assert_eq!(bucket.effective_capacity(), 5);
    }

    #[test]
    fn on_throttle_floors_at_one() {
        let bucket = TokenBucket::new(1, 1.0);
        bucket.on_throttle();
        assert_eq!(bucket.effective_capacity(), 1);
    }

    #[tokio::test]
    async fn acquire_waits_until_refill() {
        let bucket = TokenBucket::new(1, 1000.0);
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(bucket.try_acquire());
    }

    #[test]
    fn default_config_has_evernote_endpoint_overrides() {
        let config = RateLimitConfig::default();
        assert!(config.endpoint_overrides.contains_key("get_sync_chunk"));
    }

    #[test]
    fn parse_retry_after_uses_server_value() {
        assert_eq!(parse_retry_after(Some(30), Duration::from_secs(1)), Duration::from_secs(30));
    }

    #[test]
    fn parse_retry_after_falls_back_on_absence() {
        assert_eq!(parse_retry_after(None, Duration::from_secs(7)), Duration::from_secs(7));
    }

    #[tokio::test]
    async fn limiter_creates_bucket_lazily_and_acquires() {
        let limiter = AdaptiveRateLimiter::with_defaults();
        assert!(limiter.available_tokens("get_note").is_none());
        let _guard = limiter.acquire("get_note").await;
        assert!(limiter.available_tokens("get_note").is_some());
    }
}
