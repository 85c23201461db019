//! Single-key upstream fetch with bounded retries.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Sleeper, TokioSleeper};
use crate::normalize::BarNormalizer;
use crate::outcome::{FetchOutcome, TimeoutStage, UpstreamFailure};
use crate::retry::RetryPolicy;
use crate::upstream::{ProviderError, QuoteProvider, RawRow};
use crate::{FetchKey, QuoteResult};

/// Default budget for normalizing one response.
pub const DEFAULT_NORMALIZE_TIMEOUT: Duration = Duration::from_secs(3);

/// Why a single attempt produced nothing usable.
enum AttemptFailure {
    Provider(ProviderError),
    Panicked,
}

/// Wraps a [`QuoteProvider`] with the retry policy and normalization.
///
/// Empty responses and provider errors are retried with backoff; parse
/// failures are returned immediately.
pub struct RetryingFetcher {
    provider: Arc<dyn QuoteProvider>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    normalizer: BarNormalizer,
    normalize_timeout: Duration,
}

impl RetryingFetcher {
    pub fn new(provider: Arc<dyn QuoteProvider>, policy: RetryPolicy) -> Self {
        Self {
            provider,
            policy,
            sleeper: Arc::new(TokioSleeper),
            normalizer: BarNormalizer,
            normalize_timeout: DEFAULT_NORMALIZE_TIMEOUT,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_normalize_timeout(mut self, timeout: Duration) -> Self {
        self.normalize_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches and normalizes `key`, retrying transient failures.
    pub async fn fetch(&self, key: &FetchKey) -> FetchOutcome {
        let attempts = self.policy.attempts();
        let mut attempt = 0u32;

        loop {
            let last = self.policy.is_final_attempt(attempt);

            match self.download(key).await {
                Ok(rows) if !rows.is_empty() => return self.normalize(key, rows).await,
                Ok(_) if last => {
                    tracing::warn!(key = %key, attempts, "provider returned no data");
                    return FetchOutcome::EmptyData;
                }
                Ok(_) => {
                    tracing::debug!(key = %key, attempt = attempt + 1, "empty data received, retrying");
                }
                Err(AttemptFailure::Provider(err)) if last => {
                    tracing::warn!(key = %key, attempts, error = %err, "upstream fetch failed");
                    return FetchOutcome::UpstreamError(UpstreamFailure::provider(err, attempts));
                }
                Err(AttemptFailure::Panicked) if last => {
                    tracing::warn!(key = %key, attempts, "upstream worker panicked");
                    return FetchOutcome::UpstreamError(UpstreamFailure::worker_panicked(attempts));
                }
                Err(AttemptFailure::Provider(err)) => {
                    tracing::warn!(key = %key, attempt = attempt + 1, error = %err, "attempt failed, retrying");
                }
                Err(AttemptFailure::Panicked) => {
                    tracing::warn!(key = %key, attempt = attempt + 1, "upstream worker panicked, retrying");
                }
            }

            let delay = self.policy.delay_for_attempt(attempt);
            tracing::debug!(key = %key, delay_ms = delay.as_millis() as u64, "backing off");
            self.sleeper.sleep(delay).await;
            attempt += 1;
        }
    }

    async fn download(&self, key: &FetchKey) -> Result<Vec<RawRow>, AttemptFailure> {
        let provider = Arc::clone(&self.provider);
        let key = key.clone();

        match tokio::task::spawn_blocking(move || provider.download(&key)).await {
            Ok(result) => result.map_err(AttemptFailure::Provider),
            Err(_) => Err(AttemptFailure::Panicked),
        }
    }

    async fn normalize(&self, key: &FetchKey, rows: Vec<RawRow>) -> FetchOutcome {
        let normalizer = self.normalizer;
        let interval = key.interval();
        let work = tokio::task::spawn_blocking(move || normalizer.normalize(&rows, interval));

        match tokio::time::timeout(self.normalize_timeout, work).await {
            Ok(Ok(Ok(series))) => FetchOutcome::Success(Arc::new(QuoteResult::new(key.clone(), series))),
            Ok(Ok(Err(err))) => {
                tracing::warn!(key = %key, error = %err, "malformed payload, not retrying");
                FetchOutcome::ParseError(err)
            }
            Ok(Err(_)) => {
                tracing::warn!(key = %key, "normalizer panicked");
                FetchOutcome::UpstreamError(UpstreamFailure::worker_panicked(1))
            }
            Err(_) => {
                tracing::warn!(
                    key = %key,
                    budget_ms = self.normalize_timeout.as_millis() as u64,
                    "normalization timed out"
                );
                FetchOutcome::Timeout(TimeoutStage::Normalization)
            }
        }
    }
}

impl std::fmt::Debug for RetryingFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingFetcher")
            .field("policy", &self.policy)
            .field("sleeper", &self.sleeper)
            .field("normalize_timeout", &self.normalize_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::clock::RecordingSleeper;
    use crate::normalize::NormalizeError;
    use crate::outcome::UpstreamFailureKind;

    type Step = Result<Vec<RawRow>, ProviderError>;

    /// Provider replaying a fixed script; the last step repeats.
    struct Scripted {
        steps: Mutex<Vec<Step>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl QuoteProvider for Scripted {
        fn download(&self, _key: &FetchKey) -> Step {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut steps = self.steps.lock().expect("script lock");
            if steps.len() > 1 {
                steps.remove(0)
            } else {
                steps[0].clone()
            }
        }
    }

    fn rows() -> Vec<RawRow> {
        vec![
            RawRow::numeric("2024-01-02", 10.0, 11.0, 9.0, 10.5, 100),
            RawRow::numeric("2024-01-03", 10.5, 12.0, 10.0, 11.5, 200),
        ]
    }

    fn key() -> FetchKey {
        FetchKey::parse("AAPL", "1d", "1mo").expect("key")
    }

    fn fetcher(provider: Arc<Scripted>, policy: RetryPolicy) -> (RetryingFetcher, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::new());
        let fetcher = RetryingFetcher::new(provider, policy).with_sleeper(sleeper.clone());
        (fetcher, sleeper)
    }

    #[tokio::test]
    async fn first_attempt_success_does_not_back_off() {
        let provider = Scripted::new(vec![Ok(rows())]);
        let (fetcher, sleeper) = fetcher(provider.clone(), RetryPolicy::default());

        let outcome = fetcher.fetch(&key()).await;
        let result = outcome.result().expect("success");
        assert_eq!(result.bars().len(), 2);
        assert_eq!(result.label(), "Time Series (Daily)");
        assert_eq!(provider.calls(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn empty_then_data_succeeds_on_second_attempt() {
        let provider = Scripted::new(vec![Ok(Vec::new()), Ok(rows())]);
        let (fetcher, sleeper) = fetcher(provider.clone(), RetryPolicy::default());

        assert!(fetcher.fetch(&key()).await.is_success());
        assert_eq!(provider.calls(), 2);
        assert_eq!(sleeper.delays(), vec![Duration::from_millis(500)]);
    }

    #[tokio::test]
    async fn empty_on_every_attempt_is_empty_data() {
        let provider = Scripted::new(vec![Ok(Vec::new())]);
        let (fetcher, sleeper) = fetcher(provider.clone(), RetryPolicy::default());

        assert!(matches!(fetcher.fetch(&key()).await, FetchOutcome::EmptyData));
        assert_eq!(provider.calls(), 2);
        assert_eq!(sleeper.delays().len(), 1, "no sleep after the final attempt");
    }

    #[tokio::test]
    async fn provider_error_on_final_attempt_is_upstream_error() {
        let provider = Scripted::new(vec![Err(ProviderError::new("connection reset"))]);
        let (fetcher, _) = fetcher(provider.clone(), RetryPolicy::default());

        match fetcher.fetch(&key()).await {
            FetchOutcome::UpstreamError(failure) => {
                assert_eq!(failure.kind(), UpstreamFailureKind::Provider);
                assert_eq!(failure.attempts(), 2);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn parse_errors_are_never_retried() {
        let bad = RawRow {
            timestamp: json!("not a time"),
            ..RawRow::default()
        };
        let provider = Scripted::new(vec![Ok(vec![bad])]);
        let (fetcher, sleeper) = fetcher(provider.clone(), RetryPolicy::exponential(5, Duration::from_millis(500)));

        let outcome = fetcher.fetch(&key()).await;
        assert!(matches!(
            outcome,
            FetchOutcome::ParseError(NormalizeError::MalformedRow { index: 0, .. })
        ));
        assert_eq!(provider.calls(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn slow_normalization_times_out_separately() {
        let many: Vec<RawRow> = (0..200_000i64)
            .map(|offset| RawRow {
                timestamp: json!(1_600_000_000 + offset * 60),
                close: json!(offset as f64),
                ..RawRow::default()
            })
            .collect();
        let provider = Scripted::new(vec![Ok(many)]);
        let (fetcher, _) = fetcher(provider.clone(), RetryPolicy::default());
        let fetcher = fetcher.with_normalize_timeout(Duration::from_nanos(1));

        assert!(matches!(
            fetcher.fetch(&key()).await,
            FetchOutcome::Timeout(TimeoutStage::Normalization)
        ));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn panicking_provider_is_classified_and_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let provider = move |_key: &FetchKey| -> Step {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("provider bug");
            }
            Ok(rows())
        };
        let sleeper = Arc::new(RecordingSleeper::new());
        let fetcher = RetryingFetcher::new(Arc::new(provider), RetryPolicy::default())
            .with_sleeper(sleeper.clone());

        assert!(fetcher.fetch(&key()).await.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
