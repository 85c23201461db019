use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const PERIOD_UNITS: [&str; 4] = ["wk", "mo", "d", "y"];
const MAX_PERIOD_DIGITS: usize = 4;

/// Look-back window requested from the provider (`1mo`, `5d`, `ytd`, ...).
///
/// Stored lower-case so that `1MO` and `1mo` produce the same fetch key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period(String);

impl Period {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let normalized = input.trim().to_ascii_lowercase();
        if normalized == "ytd" || normalized == "max" {
            return Ok(Self(normalized));
        }

        let digits_end = normalized
            .find(|ch: char| !ch.is_ascii_digit())
            .unwrap_or(normalized.len());
        let (count, unit) = normalized.split_at(digits_end);

        let count_ok = !count.is_empty()
            && count.len() <= MAX_PERIOD_DIGITS
            && count.bytes().any(|b| b != b'0');
        if !count_ok || !PERIOD_UNITS.contains(&unit) {
            return Err(ValidationError::InvalidPeriod { value: normalized });
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Period {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Period> for String {
    fn from(value: Period) -> Self {
        value.0
    }
}
