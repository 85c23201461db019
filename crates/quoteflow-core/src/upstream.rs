//! Upstream provider contract.
//!
//! The provider's wire protocol is out of scope: a provider is a blocking call
//! that returns raw rows or an error. Rows carry loosely typed values because
//! providers disagree on shape (numbers, numeric strings, nulls).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::FetchKey;

/// One row exactly as the provider returned it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRow {
    #[serde(alias = "Date", alias = "Datetime", alias = "date")]
    pub timestamp: Value,
    #[serde(alias = "Open")]
    pub open: Value,
    #[serde(alias = "High")]
    pub high: Value,
    #[serde(alias = "Low")]
    pub low: Value,
    #[serde(alias = "Close")]
    pub close: Value,
    #[serde(alias = "Volume")]
    pub volume: Value,
}

impl RawRow {
    /// Convenience constructor for well-formed numeric rows.
    pub fn numeric(timestamp: &str, open: f64, high: f64, low: f64, close: f64, volume: u64) -> Self {
        Self {
            timestamp: Value::from(timestamp),
            open: Value::from(open),
            high: Value::from(high),
            low: Value::from(low),
            close: Value::from(close),
            volume: Value::from(volume),
        }
    }
}

/// Opaque provider failure.
///
/// The message is kept for logs only; it never reaches callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Blocking upstream download.
///
/// Implementations may block; the fetcher runs them on tokio's blocking pool.
/// An empty `Ok` vector means "no data right now" and is retried.
///
/// Any `Fn(&FetchKey) -> Result<Vec<RawRow>, ProviderError>` closure is a
/// provider:
///
/// ```rust
/// use quoteflow_core::{FetchKey, ProviderError, QuoteProvider, RawRow};
///
/// let provider = |_key: &FetchKey| -> Result<Vec<RawRow>, ProviderError> {
///     Ok(vec![RawRow::numeric("2024-01-02", 1.0, 2.0, 0.5, 1.5, 100)])
/// };
/// let key = FetchKey::parse("AAPL", "1d", "1mo").unwrap();
/// assert_eq!(provider.download(&key).unwrap().len(), 1);
/// ```
pub trait QuoteProvider: Send + Sync {
    fn download(&self, key: &FetchKey) -> Result<Vec<RawRow>, ProviderError>;
}

impl<F> QuoteProvider for F
where
    F: Fn(&FetchKey) -> Result<Vec<RawRow>, ProviderError> + Send + Sync,
{
    fn download(&self, key: &FetchKey) -> Result<Vec<RawRow>, ProviderError> {
        self(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_capitalized_provider_columns() {
        let row: RawRow = serde_json::from_value(serde_json::json!({
            "Date": "2024-01-02",
            "Open": 185.2,
            "High": "186.7",
            "Low": 183.9,
            "Close": null,
            "Volume": 41_000_000
        }))
        .expect("row should deserialize");

        assert_eq!(row.timestamp, Value::from("2024-01-02"));
        assert_eq!(row.high, Value::from("186.7"));
        assert!(row.close.is_null());
    }

    #[test]
    fn missing_columns_default_to_null() {
        let row: RawRow = serde_json::from_str(r#"{"timestamp": 1704153600}"#).expect("row");
        assert!(row.open.is_null());
        assert!(row.volume.is_null());
    }
}
