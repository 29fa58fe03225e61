#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt;
use twelvedata_exporter::{api::app_router, build_state_with_source, config::Config, AppState};
use twelvedata_market_data::{Quote, QuoteError, QuoteSource};

/// In-memory upstream answering for AAPL and MSFT only.
pub struct StubSource {
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
    latency: Duration,
}

impl StubSource {
    pub fn new(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(HashMap::new()),
            total: AtomicUsize::new(0),
            latency,
        })
    }

    pub fn calls_for(&self, symbol: &str) -> usize {
        self.calls.lock().unwrap().get(symbol).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteSource for StubSource {
    fn id(&self) -> &'static str {
        "STUB"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, QuoteError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self
            .calls
            .lock()
            .unwrap()
            .entry(symbol.to_string())
            .or_default() += 1;
        tokio::time::sleep(self.latency).await;

        let (name, previous_close, change) = match symbol {
            "AAPL" => ("Apple Inc", "100.0", "2.5"),
            "MSFT" => ("Microsoft Corp", "400.0", "-4.0"),
            _ => {
                return Err(QuoteError::Decode(
                    serde_json::from_str::<Quote>("<html>").unwrap_err(),
                ))
            }
        };
        Ok(Quote {
            symbol: symbol.to_string(),
            name: name.to_string(),
            exchange: "NASDAQ".to_string(),
            currency: "USD".to_string(),
            previous_close: previous_close.to_string(),
            change: change.to_string(),
            percent_change: "abc".to_string(),
            volume: "1000".to_string(),
            ..Quote::default()
        })
    }
}

pub fn test_config(extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("TWELVEDATA_API_KEY".into(), "test-key".into());
    vars.insert("EXPORTER_LISTEN_ADDRESS".into(), "127.0.0.1".into());
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|var| vars.get(var).cloned()).unwrap()
}

pub fn build_test_router(
    source: Arc<StubSource>,
    extra: &[(&str, &str)],
) -> (Router, Arc<AppState>) {
    let config = test_config(extra);
    let state = build_state_with_source(&config, source).unwrap();
    (app_router(state.clone(), &config), state)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, String, Option<String>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap(), content_type)
}
