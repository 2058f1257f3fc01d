//! Token-bucket rate limiting for catalog sources.
//!
//! One bucket per source, shared by every worker in the process. Waiters
//! queue on a tokio `Mutex`, which hands the lock out in request order, so
//! the first worker to block is the first served and none can starve.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::model::SourceName;

/// Snapshot of a bucket, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterState {
    pub tokens_available: u32,
    pub last_refill: Instant,
    pub min_interval_ms: u64,
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

/// A token bucket refilling one token every `min_interval`.
#[derive(Debug)]
pub struct TokenBucket {
    source: SourceName,
    capacity: u32,
    min_interval: Duration,
    bucket: Mutex<Bucket>,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(source: SourceName, capacity: u32, min_interval_ms: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            source,
            capacity,
            min_interval: Duration::from_millis(min_interval_ms.max(1)),
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Wait until a token is available and take it.
    ///
    /// The lock is held while sleeping so later callers queue behind this
    /// one. Each sleep is at most one refill interval.
    pub async fn acquire(&self) {
        let mut bucket = self.bucket.lock().await;
        loop {
            self.refill(&mut bucket, Instant::now());
            if bucket.tokens > 0 {
                bucket.tokens -= 1;
                return;
            }
            let elapsed = bucket.last_refill.elapsed();
            let wait = self.min_interval.saturating_sub(elapsed).min(self.min_interval);
            tracing::debug!(target: "enrichment::ratelimit", source = %self.source, ?wait, "Waiting for token");
            tokio::time::sleep(wait).await;
        }
    }

    pub async fn state(&self) -> RateLimiterState {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket, Instant::now());
        RateLimiterState {
            tokens_available: bucket.tokens,
            last_refill: bucket.last_refill,
            min_interval_ms: self.min_interval.as_millis() as u64,
        }
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let earned = (elapsed.as_nanos() / self.min_interval.as_nanos()) as u64;
        if earned == 0 {
            return;
        }
        let tokens = (bucket.tokens as u64 + earned).min(self.capacity as u64) as u32;
        if tokens == self.capacity {
            bucket.last_refill = now;
        } else {
            bucket.last_refill += self.min_interval * earned as u32;
        }
        bucket.tokens = tokens;
    }
}

/// Per-source rate limit settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub capacity: u32,
    pub min_interval_ms: u64,
}

impl RateLimit {
    /// One request per `min_interval_ms`, no bursts.
    pub fn per_interval(min_interval_ms: u64) -> Self {
        Self { capacity: 1, min_interval_ms }
    }
}

/// The process-wide set of buckets, one per source.
#[derive(Debug, Clone, Default)]
pub struct RateLimiterRegistry {
    buckets: HashMap<SourceName, Arc<TokenBucket>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: SourceName, limit: RateLimit) -> Self {
        self.buckets.insert(
            source,
            Arc::new(TokenBucket::new(source, limit.capacity, limit.min_interval_ms)),
        );
        self
    }

    pub fn get(&self, source: SourceName) -> Option<Arc<TokenBucket>> {
        self.buckets.get(&source).cloned()
    }

    /// Acquire a token for `source`. Sources without a bucket are unlimited.
    pub async fn acquire(&self, source: SourceName) {
        if let Some(bucket) = self.buckets.get(&source) {
            bucket.acquire().await;
        }
    }
}
