use std::sync::Arc;

use prometheus::Registry;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use twelvedata_market_data::{CacheConfig, QuoteCache, QuoteSource, RateLimiter, TwelvedataClient};

use crate::config::Config;
use crate::metrics::{process_registry, ExporterMetrics};

/// Quote source shared by every request.
pub type SharedSource = Arc<dyn QuoteSource>;

pub struct AppState {
    pub cache: QuoteCache<SharedSource>,
    pub metrics: ExporterMetrics,
    /// Registry behind `/metrics`.
    pub process_registry: Registry,
    pub scrape_path: String,
    pub listen_addr: String,
}

pub fn init_tracing() {
    let log_format = std::env::var("EXPORTER_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let client = TwelvedataClient::with_base_url(
        config.api_key.clone(),
        config.base_url.clone(),
        config.upstream_timeout,
    );
    build_state_with_source(config, Arc::new(client))
}

/// Build the state around an arbitrary quote source.
pub fn build_state_with_source(
    config: &Config,
    source: SharedSource,
) -> anyhow::Result<Arc<AppState>> {
    let limiter = RateLimiter::from_requests_per_minute(config.rate_limit, config.rate_limit_wait);
    match &limiter {
        Some(_) => tracing::info!(
            "Upstream rate limit: {} requests/min, max wait {:?}",
            config.rate_limit,
            config.rate_limit_wait
        ),
        None => tracing::info!("Upstream rate limit disabled"),
    }

    let cache = QuoteCache::new(
        source,
        CacheConfig::new(config.cache_fresh_for, config.cache_retain_for),
        limiter,
    );

    let metrics = ExporterMetrics::new()?;
    let process_registry = process_registry(&metrics)?;

    Ok(Arc::new(AppState {
        cache,
        metrics,
        process_registry,
        scrape_path: config.scrape_path.clone(),
        listen_addr: config.listen_addr.to_string(),
    }))
}
