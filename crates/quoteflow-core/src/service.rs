//! Caller-facing boundary: raw strings in, classified outcomes out.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::QuoteCache;
use crate::clock::{Clock, Sleeper, SystemClock, TokioSleeper};
use crate::config::PipelineConfig;
use crate::dispatch::DispatchPool;
use crate::error::{CoreError, SymbolListError};
use crate::fetcher::RetryingFetcher;
use crate::outcome::{FetchOutcome, QuoteResponse};
use crate::symbols::{load_symbol_list, ListedSymbol};
use crate::upstream::QuoteProvider;
use crate::FetchKey;

/// Builder for a [`QuoteService`].
///
/// ```rust
/// use quoteflow_core::{FetchKey, PipelineConfig, ProviderError, QuoteServiceBuilder, RawRow};
///
/// let provider = |_key: &FetchKey| -> Result<Vec<RawRow>, ProviderError> { Ok(Vec::new()) };
/// let service = QuoteServiceBuilder::new(provider)
///     .config(PipelineConfig::default())
///     .build();
/// assert_eq!(service.config().dispatch.workers, 10);
/// ```
pub struct QuoteServiceBuilder {
    provider: Arc<dyn QuoteProvider>,
    config: PipelineConfig,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl QuoteServiceBuilder {
    pub fn new(provider: impl QuoteProvider + 'static) -> Self {
        Self::from_shared(Arc::new(provider))
    }

    /// Start from an already shared provider.
    pub fn from_shared(provider: Arc<dyn QuoteProvider>) -> Self {
        Self {
            provider,
            config: PipelineConfig::default(),
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Start from an already shared provider, configured from the
    /// `QUOTEFLOW_*` process environment.
    pub fn from_env(provider: Arc<dyn QuoteProvider>) -> Result<Self, CoreError> {
        Self::from_lookup(provider, |var| std::env::var(var).ok())
    }

    /// Like [`QuoteServiceBuilder::from_env`] with an injectable variable lookup.
    pub fn from_lookup<F>(provider: Arc<dyn QuoteProvider>, lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = PipelineConfig::from_lookup(lookup)?;
        Ok(Self::from_shared(provider).config(config))
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Time source for cache expiry.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Waiter used between retry attempts.
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn build(self) -> QuoteService {
        let cache = Arc::new(QuoteCache::with_clock(self.config.cache, self.clock));
        let fetcher = RetryingFetcher::new(self.provider, self.config.retry)
            .with_sleeper(self.sleeper)
            .with_normalize_timeout(self.config.normalize_timeout);
        let pool = DispatchPool::new(self.config.dispatch, cache, fetcher);

        QuoteService {
            pool,
            config: self.config,
        }
    }
}

/// The quote pipeline as seen by an HTTP layer.
#[derive(Debug, Clone)]
pub struct QuoteService {
    pool: DispatchPool,
    config: PipelineConfig,
}

impl QuoteService {
    /// Validates the request and dispatches it.
    ///
    /// A `timeout_ms` of 0 uses the configured fetch timeout.
    pub async fn get_quotes(
        &self,
        symbol: &str,
        interval: &str,
        period: &str,
        timeout_ms: u64,
    ) -> FetchOutcome {
        let key = match FetchKey::parse(symbol, interval, period) {
            Ok(key) => key,
            Err(err) => {
                tracing::debug!(symbol, interval, period, error = %err, "rejected quote request");
                return FetchOutcome::InvalidRequest(err);
            }
        };

        let timeout = if timeout_ms == 0 {
            self.config.dispatch.fetch_timeout
        } else {
            Duration::from_millis(timeout_ms)
        };

        self.pool.request(key, timeout).await
    }

    /// [`get_quotes`](Self::get_quotes) mapped to a status and JSON body.
    pub async fn respond(
        &self,
        symbol: &str,
        interval: &str,
        period: &str,
        timeout_ms: u64,
    ) -> Result<QuoteResponse, CoreError> {
        let outcome = self.get_quotes(symbol, interval, period, timeout_ms).await;
        if let FetchOutcome::UpstreamError(failure) = &outcome {
            if let Some(cause) = failure.cause() {
                tracing::error!(symbol, error = %cause, "returning upstream failure");
            }
        }

        Ok(QuoteResponse::from_outcome(
            &outcome,
            symbol.trim(),
            interval,
            period,
        )?)
    }

    /// The configured curated symbol list.
    pub fn listed_symbols(&self) -> Result<Vec<ListedSymbol>, CoreError> {
        let path = self
            .config
            .stock_list_path
            .as_deref()
            .ok_or(SymbolListError::NotConfigured)?;
        Ok(load_symbol_list(path)?)
    }

    /// Stops handing out workers; see [`DispatchPool::shutdown`].
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    pub fn pool(&self) -> &DispatchPool {
        &self.pool
    }

    pub fn cache(&self) -> &Arc<QuoteCache> {
        self.pool.cache()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}
