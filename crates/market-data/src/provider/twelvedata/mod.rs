//! Twelvedata quote client.
//!
//! One `GET /quote?symbol=..&apikey=..` per call. The API reports unknown
//! symbols with HTTP 200 and an error envelope instead of a quote, so a
//! decoded payload is only accepted when it carries a `name`.
//!
//! API documentation: https://twelvedata.com/docs#quote

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::errors::QuoteError;
use crate::models::{normalize_symbol, ErrorEnvelope, Quote};
use crate::provider::QuoteSource;

pub const DEFAULT_BASE_URL: &str = "https://api.twelvedata.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const PROVIDER_ID: &str = "TWELVEDATA";
const QUOTE_ENDPOINT: &str = "/quote";

/// HTTP client for the Twelvedata `/quote` endpoint.
pub struct TwelvedataClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl TwelvedataClient {
    /// Create a client against the public API with the default timeout.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }

    /// Create a client against an arbitrary base URL.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
        }
    }

    fn map_send_error(&self, error: reqwest::Error) -> QuoteError {
        if error.is_timeout() {
            QuoteError::Timeout(self.timeout)
        } else {
            QuoteError::Transport(error)
        }
    }
}

/// Decode a `/quote` body and reject payloads that do not name an instrument.
fn decode_quote(symbol: &str, body: &str) -> Result<Quote, QuoteError> {
    let quote: Quote = serde_json::from_str(body)?;
    if quote.is_valid() {
        return Ok(quote);
    }

    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .filter(ErrorEnvelope::is_error)
        .and_then(|envelope| envelope.message);

    Err(QuoteError::NotFound {
        symbol: symbol.to_string(),
        message,
    })
}

#[async_trait]
impl QuoteSource for TwelvedataClient {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, QuoteError> {
        let symbol = normalize_symbol(symbol);
        let url = format!("{}{}", self.base_url, QUOTE_ENDPOINT);

        debug!("Twelvedata request: {} for {}", QUOTE_ENDPOINT, symbol);

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol.as_str()), ("apikey", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(QuoteError::UpstreamRateLimited);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QuoteError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|e| self.map_send_error(e))?;

        decode_quote(&symbol, &body)
    }
}
