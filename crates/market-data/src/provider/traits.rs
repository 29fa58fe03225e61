//! Quote source trait definition.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::QuoteError;
use crate::models::Quote;

/// Something that can resolve the current quote of one symbol.
///
/// [`TwelvedataClient`](super::twelvedata::TwelvedataClient) is the
/// production implementation. The cache is generic over this trait so that
/// tests can substitute an in-memory source.
///
/// Implementations perform exactly one upstream request per call and must
/// not touch shared counters or caches; that is the caller's job.
#[async_trait]
pub trait QuoteSource: Send + Sync + 'static {
    /// Short identifier used in logs.
    fn id(&self) -> &'static str;

    /// Fetch and validate the quote for `symbol`.
    ///
    /// `symbol` is already normalized. A payload without a `name` must be
    /// reported as [`QuoteError::NotFound`], never as a successful quote.
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, QuoteError>;
}

#[async_trait]
impl<T: QuoteSource + ?Sized> QuoteSource for Arc<T> {
    fn id(&self) -> &'static str {
        (**self).id()
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, QuoteError> {
        (**self).fetch_quote(symbol).await
    }
}
