use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Interval, Period, Symbol, ValidationError};

/// Identity of a requested series: symbol, interval and period.
///
/// Used verbatim as the cache key. Components are normalized on parse, so
/// `aapl/1D/1MO` and `AAPL/1d/1mo` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchKey {
    symbol: Symbol,
    interval: Interval,
    period: Period,
}

impl FetchKey {
    pub fn new(symbol: Symbol, interval: Interval, period: Period) -> Self {
        Self {
            symbol,
            interval,
            period,
        }
    }

    /// Build a key from the raw strings a caller supplies.
    pub fn parse(symbol: &str, interval: &str, period: &str) -> Result<Self, ValidationError> {
        Ok(Self::new(
            Symbol::parse(symbol)?,
            Interval::from_str(interval)?,
            Period::parse(period)?,
        ))
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn period(&self) -> &Period {
        &self.period
    }

    /// Canonical `SYMBOL/interval/period` string form.
    pub fn cache_key(&self) -> String {
        self.to_string()
    }
}

impl Display for FetchKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.symbol, self.interval, self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semantically_equal_keys_are_identical() {
        let a = FetchKey::parse(" aapl", "1D", "1MO").expect("valid");
        let b = FetchKey::parse("AAPL", "1d", "1mo").expect("valid");
        assert_eq!(a, b);
        assert_eq!(a.cache_key(), "AAPL/1d/1mo");
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn keys_differing_in_period_are_distinct() {
        let one = FetchKey::parse("AAPL", "1d", "1mo").expect("valid");
        let three = FetchKey::parse("AAPL", "1d", "3mo").expect("valid");
        assert_ne!(one, three);
        assert_ne!(one.cache_key(), three.cache_key());
    }

    #[test]
    fn reports_first_invalid_component() {
        let err = FetchKey::parse("AAPL", "7m", "1mo").expect_err("bad interval");
        assert!(matches!(err, ValidationError::InvalidInterval { .. }));
    }
}
