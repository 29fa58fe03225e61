//! Token bucket rate limiter for upstream quote requests.
//!
//! One bucket guards every cache-miss fetch of the process. It refills at
//! `requests_per_minute / 60` tokens per second up to `burst_capacity`.
//!
//! [`RateLimiter::acquire`] reserves a token and sleeps until the reservation
//! matures. If the reservation would mature later than `max_wait` from now,
//! nothing is reserved and the call fails immediately with
//! [`QuoteError::RateLimited`]. Waiters therefore queue in arrival order,
//! each one sleeping only for its own slot.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::QuoteError;

/// Default burst capacity. A bucket of one gives a strict `60 / L` spacing.
const DEFAULT_BUCKET_CAPACITY: f64 = 1.0;

/// Default bound on how long a fetch may wait for a token.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug)]
struct TokenBucket {
    /// Available tokens. Negative while reservations are outstanding.
    tokens: f64,
    last_update: Instant,
    /// Tokens per second.
    rate: f64,
    capacity: f64,
}

impl TokenBucket {
    fn with_config(requests_per_minute: u32, capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
            rate: requests_per_minute as f64 / 60.0,
            capacity,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_update = now;
    }

    fn try_acquire(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until the next unreserved token becomes available.
    fn time_until_available(&mut self) -> Duration {
        self.refill();

        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.rate)
        }
    }
}

/// Rate limiter configuration.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    /// Maximum requests per minute. Must be non-zero.
    pub requests_per_minute: u32,
    /// Maximum burst capacity.
    pub burst_capacity: f64,
    /// Longest a caller may be delayed before failing.
    pub max_wait: Duration,
}

impl RateLimitConfig {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            burst_capacity: DEFAULT_BUCKET_CAPACITY,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

/// Process-wide outbound throttle.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
    max_wait: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let capacity = config.burst_capacity.max(1.0);
        let requests_per_minute = config.requests_per_minute.max(1);

        Self {
            bucket: Mutex::new(TokenBucket::with_config(requests_per_minute, capacity)),
            max_wait: config.max_wait,
        }
    }

    /// Build a limiter from a requests-per-minute ceiling, where `0` means
    /// unlimited and yields no limiter at all.
    pub fn from_requests_per_minute(requests_per_minute: u32, max_wait: Duration) -> Option<Self> {
        if requests_per_minute == 0 {
            return None;
        }
        Some(Self::new(RateLimitConfig {
            max_wait,
            ..RateLimitConfig::new(requests_per_minute)
        }))
    }

    /// Lock the bucket, recovering from poison.
    fn lock_bucket(&self) -> MutexGuard<'_, TokenBucket> {
        self.bucket.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter bucket mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Wait for a token, failing if one cannot be granted within `max_wait`.
    pub async fn acquire(&self) -> Result<(), QuoteError> {
        let wait_time = {
            let mut bucket = self.lock_bucket();
            let wait_time = bucket.time_until_available();

            if wait_time > self.max_wait {
                debug!(
                    "Rate limiter: next token in {:?} exceeds max wait {:?}",
                    wait_time, self.max_wait
                );
                return Err(QuoteError::RateLimited {
                    waited: self.max_wait,
                });
            }

            bucket.tokens -= 1.0;
            wait_time
        };

        if wait_time > Duration::ZERO {
            debug!("Rate limiter: waiting {:?}", wait_time);
            tokio::time::sleep(wait_time).await;
        }
        Ok(())
    }

    /// Take a token only if one is available right now.
    pub fn try_acquire(&self) -> bool {
        self.lock_bucket().try_acquire()
    }

    /// Tokens currently available; negative while waiters hold reservations.
    #[cfg(test)]
    fn remaining_tokens(&self) -> f64 {
        let mut bucket = self.lock_bucket();
        bucket.refill();
        bucket.tokens
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn limiter(requests_per_minute: u32, burst_capacity: f64, max_wait: Duration) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            requests_per_minute,
            burst_capacity,
            max_wait,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_acquire() {
        let mut bucket = TokenBucket::with_config(60, 3.0);

        for _ in 0..3 {
            assert!(bucket.try_acquire());
        }
        assert!(!bucket.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_refill() {
        let mut bucket = TokenBucket::with_config(60, 1.0);

        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(bucket.try_acquire());
    }

    #[test]
    fn test_zero_means_unlimited() {
        assert!(RateLimiter::from_requests_per_minute(0, DEFAULT_MAX_WAIT).is_none());
        assert!(RateLimiter::from_requests_per_minute(30, DEFAULT_MAX_WAIT).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_enforces_spacing() {
        let limiter = limiter(60, 1.0, DEFAULT_MAX_WAIT);

        let start = Instant::now();
        limiter.acquire().await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_fails_fast_past_max_wait() {
        // One request per minute, but callers only wait a second.
        let limiter = limiter(1, 1.0, Duration::from_secs(1));

        limiter.acquire().await.unwrap();

        let start = Instant::now();
        let error = limiter.acquire().await.unwrap_err();
        assert!(matches!(error, QuoteError::RateLimited { .. }));
        assert_eq!(start.elapsed(), Duration::ZERO);

        // A failed acquire reserves nothing.
        assert!(limiter.remaining_tokens() > -0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_get_distinct_slots() {
        let limiter = Arc::new(limiter(60, 1.0, DEFAULT_MAX_WAIT));
        let start = Instant::now();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire().await.unwrap();
                    start.elapsed()
                })
            })
            .collect();

        let mut elapsed = Vec::new();
        for handle in handles {
            elapsed.push(handle.await.unwrap().as_secs());
        }
        elapsed.sort_unstable();
        assert_eq!(elapsed, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_tokens() {
        let limiter = limiter(60, 5.0, DEFAULT_MAX_WAIT);
        assert!((limiter.remaining_tokens() - 5.0).abs() < 0.01);

        limiter.try_acquire();
        limiter.try_acquire();
        assert!((limiter.remaining_tokens() - 3.0).abs() < 0.01);
    }
}
