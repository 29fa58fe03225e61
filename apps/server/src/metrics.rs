//! Prometheus metric definitions.
//!
//! [`ExporterMetrics`] holds the process-wide counters. Clones share the
//! same underlying atomics, so the one instance created at startup can be
//! registered into the long-lived `/metrics` registry and into every
//! per-scrape registry at once.
//!
//! [`QuoteGauges`] holds the five per-symbol gauges of one scrape.

use prometheus::{
    core::{Collector, Desc},
    proto::MetricFamily,
    Counter, Encoder, GaugeVec, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};

use crate::collector::QuoteSample;
use crate::error::{ApiError, ApiResult};

pub const NAMESPACE: &str = "twelvedata";

const QUOTE_LABELS: [&str; 4] = ["symbol", "name", "exchange", "currency"];

/// Scrape latencies range from a cache hit (sub-millisecond) to a
/// rate-limited miss (bounded by the limiter wait).
const DURATION_BUCKETS: [f64; 10] = [0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

#[derive(Clone)]
pub struct ExporterMetrics {
    /// Incremented once per scrape.
    pub queries: Counter,
    /// Incremented once per symbol that could not be resolved.
    pub failed_queries: Counter,
    /// End-to-end duration of one scrape.
    pub query_duration: Histogram,
}

impl ExporterMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let queries = Counter::with_opts(
            Opts::new("queries_total", "Count of completed queries").namespace(NAMESPACE),
        )?;
        let failed_queries = Counter::with_opts(
            Opts::new("failed_queries_total", "Count of failed queries").namespace(NAMESPACE),
        )?;
        let query_duration = Histogram::with_opts(
            HistogramOpts::new(
                "query_duration_seconds",
                "Duration of queries to the upstream API",
            )
            .namespace(NAMESPACE)
            .buckets(DURATION_BUCKETS.to_vec()),
        )?;

        Ok(Self {
            queries,
            failed_queries,
            query_duration,
        })
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.queries.clone()))?;
        registry.register(Box::new(self.failed_queries.clone()))?;
        registry.register(Box::new(self.query_duration.clone()))?;
        Ok(())
    }
}

/// Per-symbol gauges of one scrape.
///
/// All five descriptors are advertised on registration whether or not any
/// sample is ever recorded.
#[derive(Clone)]
pub struct QuoteGauges {
    change_price: GaugeVec,
    change_percent: GaugeVec,
    volume: GaugeVec,
    previous_close_price: GaugeVec,
    price: GaugeVec,
}

fn quote_gauge(name: &str, help: &str) -> prometheus::Result<GaugeVec> {
    GaugeVec::new(Opts::new(name, help).namespace(NAMESPACE), &QUOTE_LABELS)
}

impl QuoteGauges {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            change_price: quote_gauge("change_price", "Changed price since last close price.")?,
            change_percent: quote_gauge(
                "change_percent",
                "Changed percent since last close price.",
            )?,
            volume: quote_gauge("volume", "Trading volume during the bar.")?,
            previous_close_price: quote_gauge(
                "previous_close_price",
                "Closing price of the previous day.",
            )?,
            price: quote_gauge("price", "Real-time or the latest available price.")?,
        })
    }

    fn all(&self) -> [&GaugeVec; 5] {
        [
            &self.change_price,
            &self.change_percent,
            &self.volume,
            &self.previous_close_price,
            &self.price,
        ]
    }

    /// Set all five gauges for the sample's label set.
    pub fn record(&self, sample: &QuoteSample) {
        let labels = sample.label_values();
        self.change_price
            .with_label_values(&labels)
            .set(sample.change_price);
        self.change_percent
            .with_label_values(&labels)
            .set(sample.change_percent);
        self.volume.with_label_values(&labels).set(sample.volume);
        self.previous_close_price
            .with_label_values(&labels)
            .set(sample.previous_close);
        self.price.with_label_values(&labels).set(sample.price);
    }
}

impl Collector for QuoteGauges {
    fn desc(&self) -> Vec<&Desc> {
        self.all().into_iter().flat_map(|gauge| gauge.desc()).collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.all()
            .into_iter()
            .flat_map(|gauge| gauge.collect())
            .collect()
    }
}

/// Encode everything in `registry` in the text exposition format.
pub fn render(registry: &Registry) -> ApiResult<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| ApiError::Internal(e.to_string()))
}

/// Registry behind `/metrics`: process metrics plus the shared counters.
pub fn process_registry(metrics: &ExporterMetrics) -> prometheus::Result<Registry> {
    let registry = Registry::new();

    #[cfg(target_os = "linux")]
    registry.register(Box::new(
        prometheus::process_collector::ProcessCollector::for_self(),
    ))?;

    metrics.register(&registry)?;
    Ok(registry)
}
