//! Twelvedata Market Data Crate
//!
//! Quote retrieval for the Twelvedata exporter: the upstream client, an
//! outbound rate limiter, and a time-bounded cache that collapses
//! concurrent requests for the same symbol into one upstream call.
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |   QuoteCache     |  (fresh window, single-flight per symbol)
//! +------------------+
//!          | miss
//!          v
//! +------------------+
//! |   RateLimiter    |  (token bucket, bounded wait)
//! +------------------+
//!          |
//!          v
//! +------------------+
//! |   QuoteSource    |  (TwelvedataClient)
//! +------------------+
//! ```

pub mod cache;
pub mod errors;
pub mod models;
pub mod provider;
pub mod rate_limiter;

pub use cache::{CacheConfig, Lookup, QuoteCache, SharedQuoteError};
pub use errors::QuoteError;
pub use models::{normalize_symbol, parse_numeric, FiftyTwoWeek, Quote};
pub use provider::twelvedata::TwelvedataClient;
pub use provider::QuoteSource;
pub use rate_limiter::{RateLimitConfig, RateLimiter};
