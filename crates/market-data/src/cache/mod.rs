//! Time-bounded quote cache with single-flight fetches.
//!
//! Each symbol maps to a slot that is either a stored quote or a fetch in
//! progress. Lookups within the fresh window are served from the slot.
//! Everyone else joins the in-progress fetch for that symbol, or starts one
//! if there is none, so one symbol never has two upstream requests in flight.
//!
//! Fetches run as spawned tasks owned by the cache. A requester that goes
//! away (scrape timeout, client disconnect) stops waiting but does not
//! cancel the fetch other waiters depend on. The task stores its outcome
//! before any waiter observes it.
//!
//! Failed fetches are not cached. The slot is cleared and every waiter of
//! that flight receives the same error; the next lookup starts a new fetch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::QuoteError;
use crate::models::{normalize_symbol, Quote};
use crate::provider::QuoteSource;
use crate::rate_limiter::RateLimiter;

/// Default window during which a stored quote is served without refetching.
pub const DEFAULT_FRESH_FOR: Duration = Duration::from_secs(60);

/// Default age after which a stored quote is dropped entirely.
pub const DEFAULT_RETAIN_FOR: Duration = Duration::from_secs(300);

/// Error shared by every waiter of one failed fetch.
pub type SharedQuoteError = Arc<QuoteError>;

type FetchOutcome = Result<Arc<Quote>, SharedQuoteError>;
type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// Cache lifetimes.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub fresh_for: Duration,
    /// Always at least `fresh_for`.
    pub retain_for: Duration,
}

impl CacheConfig {
    pub fn new(fresh_for: Duration, retain_for: Duration) -> Self {
        Self {
            fresh_for,
            retain_for: retain_for.max(fresh_for),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FRESH_FOR, DEFAULT_RETAIN_FOR)
    }
}

/// Result of a cache lookup.
#[derive(Clone, Debug)]
pub struct Lookup {
    pub quote: Arc<Quote>,
    /// `true` when served from a stored entry without any upstream call.
    pub cached: bool,
}

#[derive(Debug)]
struct CacheEntry {
    quote: Arc<Quote>,
    created_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant, fresh_for: Duration) -> bool {
        now.duration_since(self.created_at) < fresh_for
    }

    fn is_expired(&self, now: Instant, retain_for: Duration) -> bool {
        now.duration_since(self.created_at) >= retain_for
    }
}

enum Slot {
    Ready(CacheEntry),
    InFlight(SharedFetch),
}

struct Inner<S> {
    source: S,
    limiter: Option<RateLimiter>,
    config: CacheConfig,
    slots: Mutex<HashMap<String, Slot>>,
}

impl<S: QuoteSource> Inner<S> {
    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| {
            warn!("Quote cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    async fn fetch_and_store(&self, symbol: String) -> FetchOutcome {
        let outcome = self.fetch_upstream(&symbol).await;

        let mut slots = self.lock_slots();
        match &outcome {
            Ok(quote) => {
                slots.insert(
                    symbol,
                    Slot::Ready(CacheEntry {
                        quote: quote.clone(),
                        created_at: Instant::now(),
                    }),
                );
            }
            Err(_) => {
                slots.remove(&symbol);
            }
        }
        outcome
    }

    async fn fetch_upstream(&self, symbol: &str) -> FetchOutcome {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await.map_err(Arc::new)?;
        }

        debug!("Fetching {} from {}", symbol, self.source.id());
        self.source
            .fetch_quote(symbol)
            .await
            .map(Arc::new)
            .map_err(Arc::new)
    }
}

/// Shared, cloneable handle to the quote cache.
pub struct QuoteCache<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for QuoteCache<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: QuoteSource> QuoteCache<S> {
    /// Create a cache over `source`. `limiter` is consulted once per
    /// upstream fetch and never on hits.
    pub fn new(source: S, config: CacheConfig, limiter: Option<RateLimiter>) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                limiter,
                config,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Return the quote for `symbol`, fetching it at most once concurrently.
    pub async fn get_or_fetch(&self, symbol: &str) -> Result<Lookup, SharedQuoteError> {
        let symbol = normalize_symbol(symbol);

        let fetch = {
            let mut slots = self.inner.lock_slots();
            let now = Instant::now();

            match slots.get(&symbol) {
                Some(Slot::Ready(entry)) if entry.is_fresh(now, self.inner.config.fresh_for) => {
                    return Ok(Lookup {
                        quote: entry.quote.clone(),
                        cached: true,
                    });
                }
                Some(Slot::InFlight(fetch)) => {
                    debug!("Joining in-flight fetch for {}", symbol);
                    fetch.clone()
                }
                // Missing, stale or past retention.
                _ => {
                    let fetch = self.start_fetch(symbol.clone());
                    slots.insert(symbol, Slot::InFlight(fetch.clone()));
                    fetch
                }
            }
        };

        fetch.await.map(|quote| Lookup {
            quote,
            cached: false,
        })
    }

    fn start_fetch(&self, symbol: String) -> SharedFetch {
        let inner = self.inner.clone();
        let task = tokio::spawn({
            let inner = inner.clone();
            let symbol = symbol.clone();
            async move { inner.fetch_and_store(symbol).await }
        });

        task.map(move |joined| match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                // The task died before clearing its slot.
                inner.lock_slots().remove(&symbol);
                Err(Arc::new(QuoteError::Aborted(e.to_string())))
            }
        })
        .boxed()
        .shared()
    }

    /// Drop stored quotes older than the retention window.
    ///
    /// In-flight fetches are never touched. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let retain_for = self.inner.config.retain_for;

        let mut slots = self.inner.lock_slots();
        let before = slots.len();
        slots.retain(|_, slot| match slot {
            Slot::Ready(entry) => !entry.is_expired(now, retain_for),
            Slot::InFlight(_) => true,
        });
        before - slots.len()
    }

    /// Number of slots, stored or in flight.
    pub fn len(&self) -> usize {
        self.inner.lock_slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::rate_limiter::RateLimitConfig;

    /// In-memory source that counts calls and takes `latency` to answer.
    struct CountingSource {
        calls: AtomicUsize,
        latency: Duration,
        quotes: HashMap<String, Quote>,
    }

    impl CountingSource {
        fn new(symbols: &[&str]) -> Arc<Self> {
            let quotes = symbols
                .iter()
                .map(|s| {
                    let quote = Quote {
                        symbol: s.to_string(),
                        name: format!("{} Corp", s),
                        previous_close: "100.0".to_string(),
                        change: "2.5".to_string(),
                        ..Quote::default()
                    };
                    (s.to_string(), quote)
                })
                .collect();
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                latency: Duration::from_millis(100),
                quotes,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QuoteSource for CountingSource {
        fn id(&self) -> &'static str {
            "COUNTING"
        }

        async fn fetch_quote(&self, symbol: &str) -> Result<Quote, QuoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            self.quotes
                .get(symbol)
                .cloned()
                .ok_or_else(|| QuoteError::NotFound {
                    symbol: symbol.to_string(),
                    message: None,
                })
        }
    }

    fn cache(source: &Arc<CountingSource>) -> QuoteCache<Arc<CountingSource>> {
        QuoteCache::new(source.clone(), CacheConfig::default(), None)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_lookups_share_one_fetch() {
        let source = CountingSource::new(&["AAPL"]);
        let cache = cache(&source);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_or_fetch("AAPL").await })
            })
            .collect();

        let mut quotes = Vec::new();
        for handle in handles {
            let lookup = handle.await.unwrap().unwrap();
            assert!(!lookup.cached);
            quotes.push(lookup.quote);
        }

        assert_eq!(source.calls(), 1);
        assert!(quotes.iter().all(|q| Arc::ptr_eq(q, &quotes[0])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_is_served_from_cache() {
        let source = CountingSource::new(&["AAPL"]);
        let cache = cache(&source);

        let first = cache.get_or_fetch("AAPL").await.unwrap();
        assert!(!first.cached);

        tokio::time::advance(Duration::from_secs(30)).await;
        let second = cache.get_or_fetch("AAPL").await.unwrap();
        assert!(second.cached);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_is_refetched() {
        let source = CountingSource::new(&["AAPL"]);
        let cache = cache(&source);

        cache.get_or_fetch("AAPL").await.unwrap();
        tokio::time::advance(DEFAULT_FRESH_FOR).await;

        let lookup = cache.get_or_fetch("AAPL").await.unwrap();
        assert!(!lookup.cached);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_past_retention_is_purged_and_refetched() {
        let source = CountingSource::new(&["AAPL", "MSFT"]);
        let cache = cache(&source);

        cache.get_or_fetch("AAPL").await.unwrap();
        tokio::time::advance(Duration::from_secs(200)).await;
        cache.get_or_fetch("MSFT").await.unwrap();

        tokio::time::advance(Duration::from_secs(150)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);

        let lookup = cache.get_or_fetch("AAPL").await.unwrap();
        assert!(!lookup.cached);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_symbol_case_shares_entry() {
        let source = CountingSource::new(&["AAPL"]);
        let cache = cache(&source);

        cache.get_or_fetch("aapl").await.unwrap();
        let lookup = cache.get_or_fetch("AAPL").await.unwrap();

        assert!(lookup.cached);
        assert_eq!(cache.len(), 1);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_shared_but_not_cached() {
        let source = CountingSource::new(&[]);
        let cache = cache(&source);

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_or_fetch("BADSYM").await })
            })
            .collect();
        for handle in handles {
            let error = handle.await.unwrap().unwrap_err();
            assert!(matches!(*error, QuoteError::NotFound { .. }));
        }
        assert_eq!(source.calls(), 1);
        assert!(cache.is_empty());

        assert!(cache.get_or_fetch("BADSYM").await.is_err());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_requester_does_not_cancel_fetch() {
        let source = CountingSource::new(&["AAPL"]);
        let cache = cache(&source);

        let requester = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get_or_fetch("AAPL").await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        requester.abort();

        tokio::time::sleep(Duration::from_millis(200)).await;
        let lookup = cache.get_or_fetch("AAPL").await.unwrap();
        assert!(lookup.cached);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_only_applies_to_misses() {
        let source = CountingSource::new(&["AAPL", "MSFT"]);
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_minute: 1,
            burst_capacity: 1.0,
            max_wait: Duration::from_secs(1),
        });
        let cache = QuoteCache::new(source.clone(), CacheConfig::default(), Some(limiter));

        cache.get_or_fetch("AAPL").await.unwrap();

        let error = cache.get_or_fetch("MSFT").await.unwrap_err();
        assert!(matches!(*error, QuoteError::RateLimited { .. }));
        assert_eq!(source.calls(), 1);

        let hit = cache.get_or_fetch("AAPL").await.unwrap();
        assert!(hit.cached);
    }

    #[test]
    fn test_retention_never_shorter_than_freshness() {
        let config = CacheConfig::new(Duration::from_secs(60), Duration::from_secs(10));
        assert_eq!(config.retain_for, Duration::from_secs(60));
    }
}
