//! Terminal fetch outcomes and their mapping to HTTP-style responses.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde_json::{json, Value};

use crate::normalize::NormalizeError;
use crate::upstream::ProviderError;
use crate::{QuoteResult, ValidationError};

/// Which budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutStage {
    /// The caller's end-to-end wait, including time queued for a worker.
    Dispatch,
    /// The normalization budget after raw rows arrived.
    Normalization,
}

/// Classification of an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamFailureKind {
    /// The provider returned an error on the final attempt.
    Provider,
    /// The provider or normalizer panicked on the final attempt.
    WorkerPanicked,
    /// The pool was shut down before a worker picked the fetch up.
    PoolClosed,
    /// The fetch task ended without publishing an outcome.
    Abandoned,
}

impl UpstreamFailureKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::WorkerPanicked => "worker_panicked",
            Self::PoolClosed => "pool_closed",
            Self::Abandoned => "abandoned",
        }
    }
}

/// Upstream failure after the retry budget is spent.
///
/// The provider's message is retained for logging through [`cause`] but is
/// deliberately absent from `Display`.
///
/// [`cause`]: UpstreamFailure::cause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamFailure {
    kind: UpstreamFailureKind,
    attempts: u32,
    cause: Option<ProviderError>,
}

impl UpstreamFailure {
    pub fn provider(cause: ProviderError, attempts: u32) -> Self {
        Self {
            kind: UpstreamFailureKind::Provider,
            attempts,
            cause: Some(cause),
        }
    }

    pub fn worker_panicked(attempts: u32) -> Self {
        Self {
            kind: UpstreamFailureKind::WorkerPanicked,
            attempts,
            cause: None,
        }
    }

    pub fn pool_closed() -> Self {
        Self {
            kind: UpstreamFailureKind::PoolClosed,
            attempts: 0,
            cause: None,
        }
    }

    pub fn abandoned() -> Self {
        Self {
            kind: UpstreamFailureKind::Abandoned,
            attempts: 0,
            cause: None,
        }
    }

    pub const fn kind(&self) -> UpstreamFailureKind {
        self.kind
    }

    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn cause(&self) -> Option<&ProviderError> {
        self.cause.as_ref()
    }
}

impl Display for UpstreamFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "upstream failure ({}) after {} attempt(s)",
            self.kind.as_str(),
            self.attempts
        )
    }
}

impl std::error::Error for UpstreamFailure {}

/// Result of one request through the pipeline.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success(Arc<QuoteResult>),
    /// The provider kept returning no rows until the retry budget ran out.
    EmptyData,
    UpstreamError(UpstreamFailure),
    Timeout(TimeoutStage),
    ParseError(NormalizeError),
    /// The caller's symbol/interval/period did not form a valid key.
    InvalidRequest(ValidationError),
}

impl FetchOutcome {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn result(&self) -> Option<&Arc<QuoteResult>> {
        match self {
            Self::Success(result) => Some(result),
            _ => None,
        }
    }

    /// Stable machine-readable code for logs and metrics labels.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Success(_) => "quote.success",
            Self::EmptyData => "quote.empty_data",
            Self::UpstreamError(_) => "quote.upstream_error",
            Self::Timeout(_) => "quote.timeout",
            Self::ParseError(_) => "quote.parse_error",
            Self::InvalidRequest(_) => "quote.invalid_request",
        }
    }

    /// HTTP status class the boundary layer answers with.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Success(_) => 200,
            Self::InvalidRequest(_) => 400,
            Self::EmptyData => 404,
            Self::UpstreamError(_) | Self::ParseError(_) => 500,
            Self::Timeout(_) => 503,
        }
    }
}

/// Status and JSON body handed to the HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteResponse {
    pub status: u16,
    pub body: Value,
}

impl QuoteResponse {
    /// Maps an outcome to a response. Error bodies carry a fixed, caller-safe
    /// message; provider text never leaks through.
    pub fn from_outcome(
        outcome: &FetchOutcome,
        symbol: &str,
        interval: &str,
        period: &str,
    ) -> Result<Self, serde_json::Error> {
        let body = match outcome {
            FetchOutcome::Success(result) => serde_json::to_value(result.payload())?,
            FetchOutcome::EmptyData => error_body(format!(
                "No data available for {symbol} with interval={interval}, period={period}"
            )),
            FetchOutcome::Timeout(_) => error_body(format!(
                "Request timeout for {symbol}. Server is experiencing high load."
            )),
            FetchOutcome::UpstreamError(_) => {
                error_body(format!("Failed to retrieve data for {symbol}"))
            }
            FetchOutcome::ParseError(_) => error_body(format!("Error processing data for {symbol}")),
            FetchOutcome::InvalidRequest(err) => {
                error_body(format!("Invalid request for {symbol}: {err}"))
            }
        };

        Ok(Self {
            status: outcome.status_code(),
            body,
        })
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

fn error_body(message: String) -> Value {
    json!({ "error": message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::RowDefect;

    #[test]
    fn every_outcome_maps_to_one_status() {
        let cases = [
            (FetchOutcome::EmptyData, 404),
            (FetchOutcome::Timeout(TimeoutStage::Dispatch), 503),
            (FetchOutcome::Timeout(TimeoutStage::Normalization), 503),
            (
                FetchOutcome::UpstreamError(UpstreamFailure::pool_closed()),
                500,
            ),
            (
                FetchOutcome::ParseError(NormalizeError::MalformedRow {
                    index: 0,
                    defect: RowDefect::Timestamp,
                }),
                500,
            ),
            (
                FetchOutcome::InvalidRequest(ValidationError::EmptySymbol),
                400,
            ),
        ];

        for (outcome, status) in cases {
            assert_eq!(outcome.status_code(), status, "{}", outcome.code());
            let response =
                QuoteResponse::from_outcome(&outcome, "AAPL", "1d", "1mo").expect("serializable");
            assert_eq!(response.status, status);
            assert!(response.body["error"].is_string());
        }
    }

    #[test]
    fn upstream_text_never_reaches_the_body() {
        let failure = UpstreamFailure::provider(ProviderError::new("secret-token=abc123 refused"), 2);
        assert!(!failure.to_string().contains("secret"));
        assert_eq!(failure.cause().map(ProviderError::message), Some("secret-token=abc123 refused"));

        let response = QuoteResponse::from_outcome(
            &FetchOutcome::UpstreamError(failure),
            "AAPL",
            "1d",
            "1mo",
        )
        .expect("serializable");

        assert_eq!(response.body["error"], "Failed to retrieve data for AAPL");
    }

    #[test]
    fn empty_data_message_names_the_request() {
        let response = QuoteResponse::from_outcome(&FetchOutcome::EmptyData, "MSFT", "5m", "1d")
            .expect("serializable");
        assert_eq!(
            response.body["error"],
            "No data available for MSFT with interval=5m, period=1d"
        );
    }
}
