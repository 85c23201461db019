//! Conversion of raw provider rows into canonical bars.
//!
//! Two separate paths decide what happens to bad input:
//!
//! - [`parse_price`] / [`parse_volume`] degrade a single unreadable field to
//!   `None` and keep the bar.
//! - [`classify_row`] rejects a row outright when its timestamp is unusable or
//!   none of its numeric fields parse, which fails the whole series.

use std::cmp::Ordering;

use serde_json::Value;
use thiserror::Error;

use crate::upstream::RawRow;
use crate::{Bar, Interval, Series, UtcDateTime};

/// Why a whole row was rejected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RowDefect {
    #[error("timestamp is missing or unreadable")]
    Timestamp,
    #[error("no OHLCV field holds a number")]
    NoNumericFields,
}

/// Normalization failure. Never retried: the payload itself is bad.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("row {index} is unparseable: {defect}")]
    MalformedRow { index: usize, defect: RowDefect },
    #[error("row {index} breaks strictly monotonic timestamp order")]
    NonMonotonicTimestamps { index: usize },
}

/// Stateless row-to-bar converter.
#[derive(Debug, Clone, Copy, Default)]
pub struct BarNormalizer;

impl BarNormalizer {
    /// Converts `rows` into a labelled series, keeping provider order.
    ///
    /// Timestamps must move strictly in one direction (ascending or
    /// descending). An empty input yields an empty series.
    pub fn normalize(&self, rows: &[RawRow], interval: Interval) -> Result<Series, NormalizeError> {
        let mut bars: Vec<Bar> = Vec::with_capacity(rows.len());
        let mut direction: Option<Ordering> = None;
        let mut degraded_fields = 0usize;

        for (index, row) in rows.iter().enumerate() {
            let ts = classify_row(row).map_err(|defect| NormalizeError::MalformedRow { index, defect })?;

            if let Some(previous) = bars.last() {
                let step = ts.cmp(&previous.ts);
                if step == Ordering::Equal || direction.is_some_and(|expected| expected != step) {
                    return Err(NormalizeError::NonMonotonicTimestamps { index });
                }
                direction = Some(step);
            }

            let bar = Bar {
                ts,
                open: parse_price(&row.open),
                high: parse_price(&row.high),
                low: parse_price(&row.low),
                close: parse_price(&row.close),
                volume: parse_volume(&row.volume),
            };
            degraded_fields += missing_fields(&bar);
            bars.push(bar);
        }

        if degraded_fields > 0 {
            tracing::debug!(
                rows = rows.len(),
                degraded_fields,
                "normalized series with null fields"
            );
        }

        Ok(Series {
            label: interval.series_label(),
            bars,
        })
    }
}

/// Free-function form of [`BarNormalizer::normalize`].
pub fn normalize(rows: &[RawRow], interval: Interval) -> Result<Series, NormalizeError> {
    BarNormalizer.normalize(rows, interval)
}

/// Whole-row check. Returns the bar timestamp when the row is usable.
///
/// A row whose five fields are all null or non-numeric is fatal on purpose:
/// it fails the whole series instead of producing an all-null bar.
pub fn classify_row(row: &RawRow) -> Result<UtcDateTime, RowDefect> {
    let ts = parse_timestamp(&row.timestamp).ok_or(RowDefect::Timestamp)?;

    let any_numeric = [&row.open, &row.high, &row.low, &row.close]
        .into_iter()
        .any(|value| parse_price(value).is_some())
        || parse_volume(&row.volume).is_some();

    if any_numeric {
        Ok(ts)
    } else {
        Err(RowDefect::NoNumericFields)
    }
}

/// Lenient price parse: numbers and numeric strings, finite values only.
pub fn parse_price(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;

    parsed.is_finite().then_some(parsed)
}

/// Lenient volume parse: non-negative, rounded to a whole share count.
pub fn parse_volume(value: &Value) -> Option<u64> {
    if let Value::Number(number) = value {
        if let Some(exact) = number.as_u64() {
            return Some(exact);
        }
    }

    let parsed = parse_price(value)?;
    (parsed >= 0.0 && parsed <= u64::MAX as f64).then(|| parsed.round() as u64)
}

fn parse_timestamp(value: &Value) -> Option<UtcDateTime> {
    match value {
        Value::String(text) => UtcDateTime::parse(text).ok(),
        Value::Number(number) => number
            .as_i64()
            .and_then(|seconds| UtcDateTime::from_unix_seconds(seconds).ok()),
        _ => None,
    }
}

fn missing_fields(bar: &Bar) -> usize {
    [bar.open, bar.high, bar.low, bar.close]
        .iter()
        .filter(|field| field.is_none())
        .count()
        + usize::from(bar.volume.is_none())
}
