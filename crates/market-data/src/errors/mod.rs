//! Error types for the quote pipeline.
//!
//! [`QuoteError`] covers every way a single-symbol lookup can fail, from the
//! local rate limiter through the HTTP round trip to payload validation.
//! None of these abort a scrape; the caller records the failure and moves on
//! to the next symbol.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while resolving a quote for one symbol.
#[derive(Error, Debug)]
pub enum QuoteError {
    /// The HTTP request could not be sent or the body could not be read.
    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The upstream did not answer within the client timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The upstream answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Response status code
        status: u16,
        /// Response body, as returned
        body: String,
    },

    /// The upstream answered with HTTP 429.
    #[error("Upstream rate limit exceeded")]
    UpstreamRateLimited,

    /// The response body was not a quote document.
    #[error("Failed to decode quote: {0}")]
    Decode(#[from] serde_json::Error),

    /// The response decoded but carried no `name`, which is how the API
    /// reports unknown symbols and error envelopes.
    #[error("Symbol not found: {symbol}{}", upstream_detail(.message))]
    NotFound {
        /// Requested symbol
        symbol: String,
        /// Upstream error message, when the payload carried one
        message: Option<String>,
    },

    /// The local rate limiter could not hand out a token in time.
    #[error("Rate limiter wait exceeded {waited:?}")]
    RateLimited {
        /// The bound that was exceeded
        waited: Duration,
    },

    /// The cache-owned fetch task ended without producing an outcome.
    #[error("Fetch aborted: {0}")]
    Aborted(String),
}

fn upstream_detail(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(" ({m})"))
        .unwrap_or_default()
}

impl QuoteError {
    /// Whether retrying the same symbol later could plausibly succeed.
    ///
    /// Only used to pick a log level; the cache never retries on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_)
            | Self::Timeout(_)
            | Self::UpstreamRateLimited
            | Self::RateLimited { .. }
            | Self::Aborted(_) => true,
            Self::Http { status, .. } => *status >= 500,
            Self::Decode(_) | Self::NotFound { .. } => false,
        }
    }
}
