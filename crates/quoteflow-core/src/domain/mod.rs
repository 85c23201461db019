//! # Domain Models
//!
//! Canonical types shared by every pipeline stage.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`FetchKey`] | Symbol + interval + period; the cache key |
//! | [`Symbol`] | Validated ticker |
//! | [`Interval`] | Bar spacing (1m .. 3mo) |
//! | [`Period`] | Look-back window (5d, 1mo, ytd, max) |
//! | [`UtcDateTime`] | Second-precision UTC timestamp |
//! | [`Bar`] | OHLCV bar with nullable fields |
//! | [`Series`] | Normalizer output |
//! | [`QuoteResult`] | Cached, immutable series for a key |
//!
//! All key components normalize on construction, so two semantically equal
//! requests always produce the same [`FetchKey`]:
//!
//! ```rust
//! use quoteflow_core::FetchKey;
//!
//! let a = FetchKey::parse("aapl", "1D", "1MO").unwrap();
//! let b = FetchKey::parse("AAPL", "1d", "1mo").unwrap();
//! assert_eq!(a, b);
//! assert_eq!(a.to_string(), "AAPL/1d/1mo");
//! ```

mod interval;
mod key;
mod models;
mod period;
mod symbol;
mod timestamp;

pub use interval::Interval;
pub use key::FetchKey;
pub use models::{Bar, QuoteResult, Series, SeriesPayload};
pub use period::Period;
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
