//! Quote data types
//!
//! - `quote` - The upstream quote document and helpers for reading its
//!   string-encoded numeric fields

mod quote;

pub(crate) use quote::ErrorEnvelope;
pub use quote::{normalize_symbol, parse_numeric, FiftyTwoWeek, Quote};
