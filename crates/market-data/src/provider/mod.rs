//! Upstream quote sources.
//!
//! This module contains:
//! - The `QuoteSource` trait the cache fetches through
//! - The Twelvedata HTTP client

mod traits;

pub mod twelvedata;

pub use traits::QuoteSource;
