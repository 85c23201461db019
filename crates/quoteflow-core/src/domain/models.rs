use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::{FetchKey, UtcDateTime};

/// Canonical OHLCV bar.
///
/// Price and volume fields are optional: a field the provider sent in an
/// unreadable form is carried as `None` rather than dropping the bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: UtcDateTime,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<u64>,
}

/// Normalizer output: the series label plus bars in provider order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub label: String,
    pub bars: Vec<Bar>,
}

/// Normalized series together with the key that produced it.
///
/// Immutable once built; cached and handed out as `Arc<QuoteResult>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteResult {
    key: FetchKey,
    label: String,
    bars: Vec<Bar>,
}

impl QuoteResult {
    pub fn new(key: FetchKey, series: Series) -> Self {
        Self {
            key,
            label: series.label,
            bars: series.bars,
        }
    }

    pub fn key(&self) -> &FetchKey {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Response payload view, shaped as
    /// `{label: {timestamp: {"1. open": .., .., "5. volume": ..}}}`.
    pub fn payload(&self) -> SeriesPayload<'_> {
        SeriesPayload(self)
    }
}

/// Serializes a [`QuoteResult`] in the wire shape served to callers, emitting
/// bars in stored order.
#[derive(Debug, Clone, Copy)]
pub struct SeriesPayload<'a>(&'a QuoteResult);

impl Serialize for SeriesPayload<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut outer = serializer.serialize_map(Some(1))?;
        outer.serialize_entry(self.0.label(), &BarRows(self.0.bars()))?;
        outer.end()
    }
}

struct BarRows<'a>(&'a [Bar]);

impl Serialize for BarRows<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut rows = serializer.serialize_map(Some(self.0.len()))?;
        for bar in self.0 {
            rows.serialize_entry(&bar.ts.format_canonical(), &BarFields::from(bar))?;
        }
        rows.end()
    }
}

#[derive(Serialize)]
struct BarFields {
    #[serde(rename = "1. open")]
    open: Option<f64>,
    #[serde(rename = "2. high")]
    high: Option<f64>,
    #[serde(rename = "3. low")]
    low: Option<f64>,
    #[serde(rename = "4. close")]
    close: Option<f64>,
    #[serde(rename = "5. volume")]
    volume: Option<u64>,
}

impl From<&Bar> for BarFields {
    fn from(bar: &Bar) -> Self {
        Self {
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Interval;

    fn bar(ts: &str, close: Option<f64>) -> Bar {
        Bar {
            ts: UtcDateTime::parse(ts).expect("timestamp"),
            open: Some(10.0),
            high: Some(11.0),
            low: Some(9.5),
            close,
            volume: Some(1_200),
        }
    }

    #[test]
    fn payload_uses_series_label_and_numbered_fields() {
        let key = FetchKey::parse("AAPL", "1d", "1mo").expect("key");
        let result = QuoteResult::new(
            key,
            Series {
                label: Interval::OneDay.series_label(),
                bars: vec![bar("2024-01-02", Some(10.5))],
            },
        );

        let json = serde_json::to_value(result.payload()).expect("serializable");
        let row = &json["Time Series (Daily)"]["2024-01-02 00:00:00"];
        assert_eq!(row["1. open"], 10.0);
        assert_eq!(row["4. close"], 10.5);
        assert_eq!(row["5. volume"], 1_200);
    }

    #[test]
    fn payload_keeps_descending_provider_order_and_nulls() {
        let key = FetchKey::parse("MSFT", "5m", "1d").expect("key");
        let result = QuoteResult::new(
            key,
            Series {
                label: Interval::FiveMinutes.series_label(),
                bars: vec![
                    bar("2024-01-02 15:05:00", None),
                    bar("2024-01-02 15:00:00", Some(10.0)),
                ],
            },
        );

        let text = serde_json::to_string(&result.payload()).expect("serializable");
        let later = text.find("15:05:00").expect("later bar present");
        let earlier = text.find("15:00:00").expect("earlier bar present");
        assert!(later < earlier, "bars must not be re-sorted: {text}");
        assert!(text.contains("\"4. close\":null"));
    }
}
