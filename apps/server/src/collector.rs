//! Per-scrape quote collection.
//!
//! A [`PriceCollector`] is built for one `/price` request. It resolves every
//! requested symbol through the shared cache, records five gauges for each
//! one that succeeds, and counts the rest as failed queries. A failed symbol
//! never produces a partial sample and never fails the scrape.

use std::time::Instant;

use futures::future::join_all;
use prometheus::Registry;
use tracing::{error, info, warn};
use twelvedata_market_data::{parse_numeric, Quote, QuoteCache, QuoteSource};

use crate::error::{ApiError, ApiResult};
use crate::metrics::{ExporterMetrics, QuoteGauges};

pub const SYMBOLS_PARAM: &str = "symbols";

/// Flatten every `symbols` occurrence into one ordered list.
///
/// `symbols=AAA,BBB&symbols=CCC` yields `[AAA, BBB, CCC]`. Values are kept
/// as given; empty comma parts are dropped. A query without any `symbols`
/// key is rejected.
pub fn parse_symbols(pairs: &[(String, String)]) -> ApiResult<Vec<String>> {
    let mut found = false;
    let mut symbols = Vec::new();

    for (key, value) in pairs {
        if key != SYMBOLS_PARAM {
            continue;
        }
        found = true;
        symbols.extend(
            value
                .split(',')
                .filter(|part| !part.is_empty())
                .map(str::to_string),
        );
    }

    if !found {
        return Err(ApiError::MissingParameter(SYMBOLS_PARAM));
    }
    Ok(symbols)
}

/// Values emitted for one resolved symbol.
#[derive(Clone, Debug, PartialEq)]
pub struct QuoteSample {
    pub symbol: String,
    pub name: String,
    pub exchange: String,
    pub currency: String,
    pub change_price: f64,
    pub change_percent: f64,
    pub volume: f64,
    pub previous_close: f64,
    /// `previous_close + change_price`
    pub price: f64,
}

impl QuoteSample {
    pub fn from_quote(quote: &Quote) -> Self {
        let change_price = parse_numeric(&quote.change);
        let previous_close = parse_numeric(&quote.previous_close);

        Self {
            symbol: quote.symbol.clone(),
            name: quote.name.clone(),
            exchange: quote.exchange.clone(),
            currency: quote.currency.clone(),
            change_price,
            change_percent: parse_numeric(&quote.percent_change),
            volume: parse_numeric(&quote.volume),
            previous_close,
            price: previous_close + change_price,
        }
    }

    /// Label values in `symbol, name, exchange, currency` order.
    pub fn label_values(&self) -> [&str; 4] {
        [
            self.symbol.as_str(),
            self.name.as_str(),
            self.exchange.as_str(),
            self.currency.as_str(),
        ]
    }
}

/// `", as of <rfc3339>"` when the quote carries a bar timestamp.
fn as_of(quote: &Quote) -> String {
    quote
        .observed_at()
        .map(|at| format!(", as of {}", at.to_rfc3339()))
        .unwrap_or_default()
}

pub struct PriceCollector<S> {
    cache: QuoteCache<S>,
    metrics: ExporterMetrics,
    gauges: QuoteGauges,
    symbols: Vec<String>,
}

impl<S: QuoteSource> PriceCollector<S> {
    pub fn new(
        cache: QuoteCache<S>,
        metrics: ExporterMetrics,
        symbols: Vec<String>,
    ) -> prometheus::Result<Self> {
        Ok(Self {
            cache,
            metrics,
            gauges: QuoteGauges::new()?,
            symbols,
        })
    }

    /// Resolve all symbols and record their gauges.
    ///
    /// Lookups for distinct symbols run concurrently; samples come back in
    /// request order. The query counter moves once per call and the
    /// duration histogram observes the whole call.
    pub async fn collect(&self) -> Vec<QuoteSample> {
        let started = Instant::now();
        self.metrics.queries.inc();

        let lookups = join_all(
            self.symbols
                .iter()
                .map(|symbol| self.cache.get_or_fetch(symbol)),
        )
        .await;

        let mut samples = Vec::with_capacity(lookups.len());
        for (symbol, lookup) in self.symbols.iter().zip(lookups) {
            match lookup {
                Ok(lookup) => {
                    let sample = QuoteSample::from_quote(&lookup.quote);
                    self.gauges.record(&sample);
                    info!(
                        "Retrieved {}{}, price: {}{}",
                        sample.symbol,
                        if lookup.cached { " (cached)" } else { "" },
                        sample.price,
                        as_of(&lookup.quote)
                    );
                    samples.push(sample);
                }
                Err(e) => {
                    self.metrics.failed_queries.inc();
                    if e.is_transient() {
                        warn!("Failed to retrieve {}: {}", symbol, e);
                    } else {
                        error!("Failed to retrieve {}: {}", symbol, e);
                    }
                }
            }
        }

        self.metrics
            .query_duration
            .observe(started.elapsed().as_secs_f64());
        samples
    }

    /// Registry for the scrape response: this scrape's gauges plus the
    /// shared counters.
    pub fn into_registry(self) -> prometheus::Result<Registry> {
        let registry = Registry::new();
        registry.register(Box::new(self.gauges))?;
        self.metrics.register(&registry)?;
        Ok(registry)
    }
}
