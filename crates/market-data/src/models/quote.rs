use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of one symbol as returned by the `/quote` endpoint.
///
/// Numeric fields stay as the strings the API sends; use [`parse_numeric`]
/// at the point of consumption. Every field defaults when absent so that
/// the API's error envelope still decodes and can be rejected by the
/// empty-`name` check instead of surfacing as a decode error.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub exchange: String,
    pub mic_code: String,
    pub currency: String,
    pub datetime: String,
    /// Unix seconds of the last bar
    pub timestamp: i64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    pub previous_close: String,
    pub change: String,
    pub percent_change: String,
    pub average_volume: String,
    pub is_market_open: bool,
    pub fifty_two_week: FiftyTwoWeek,
}

/// 52-week range record nested in [`Quote`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiftyTwoWeek {
    pub low: String,
    pub high: String,
    pub low_change: String,
    pub high_change: String,
    pub low_change_percent: String,
    pub high_change_percent: String,
    pub range: String,
}

/// Fields the API adds when it rejects a request with HTTP 200.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ErrorEnvelope {
    pub code: Option<i64>,
    pub message: Option<String>,
    pub status: Option<String>,
}

impl ErrorEnvelope {
    pub(crate) fn is_error(&self) -> bool {
        self.status.as_deref() == Some("error") || self.code.is_some_and(|c| c >= 400)
    }
}

impl Quote {
    /// A quote is only usable if the upstream identified the instrument.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
    }

    /// Time of the last bar, when the upstream sent one.
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        if self.timestamp <= 0 {
            return None;
        }
        Utc.timestamp_opt(self.timestamp, 0).single()
    }
}

/// Parse an upstream numeric string, treating anything unparseable as `0`.
pub fn parse_numeric(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// Canonical form of a ticker: trimmed and upper-cased.
///
/// The cache key and the upstream `symbol` parameter both go through here.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
