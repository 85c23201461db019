//! Bounded-concurrency dispatch in front of the cache and fetcher.
//!
//! A tokio [`Semaphore`] stands in for a fixed worker pool: every fetch is a
//! spawned task that must hold a permit while it talks to upstream. Callers
//! only wait on a `watch` channel, so a caller timeout abandons the wait and
//! never the fetch. A fetch that finishes after its caller gave up still
//! fills the cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::Instrument;
use uuid::Uuid;

use crate::cache::QuoteCache;
use crate::fetcher::RetryingFetcher;
use crate::outcome::{FetchOutcome, TimeoutStage, UpstreamFailure};
use crate::{FetchKey, QuoteResult};

/// Worker pool sizing and request budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Concurrent upstream fetches, clamped to `1..=Semaphore::MAX_PERMITS`.
    pub workers: usize,
    /// End-to-end budget a caller waits when it does not pass its own.
    pub fetch_timeout: Duration,
    /// Share one fetch between concurrent requests for the same key.
    ///
    /// Enabled by default. With it disabled every cache miss starts its own
    /// upstream fetch, even when one for the same key is already running.
    pub single_flight: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            fetch_timeout: Duration::from_secs(5),
            single_flight: true,
        }
    }
}

type Published = watch::Receiver<Option<FetchOutcome>>;

#[derive(Debug)]
struct InFlight {
    generation: u64,
    outcome: Published,
}

enum Subscription {
    Cached(Arc<QuoteResult>),
    Waiting(Published),
}

#[derive(Debug)]
struct PoolShared {
    cache: Arc<QuoteCache>,
    fetcher: RetryingFetcher,
    permits: Semaphore,
    in_flight: Mutex<HashMap<FetchKey, InFlight>>,
    next_generation: AtomicU64,
    fetches_started: AtomicU64,
}

/// Cache-first request dispatcher with a bounded pool of fetch workers.
///
/// Cloning is cheap and every clone shares the same pool, cache and
/// in-flight table.
#[derive(Debug, Clone)]
pub struct DispatchPool {
    shared: Arc<PoolShared>,
    config: DispatchConfig,
}

impl DispatchPool {
    pub fn new(config: DispatchConfig, cache: Arc<QuoteCache>, fetcher: RetryingFetcher) -> Self {
        let workers = config.workers.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            shared: Arc::new(PoolShared {
                cache,
                fetcher,
                permits: Semaphore::new(workers),
                in_flight: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                fetches_started: AtomicU64::new(0),
            }),
            config: DispatchConfig { workers, ..config },
        }
    }

    /// Serves `key` from the cache or dispatches a fetch and waits up to
    /// `timeout` for it.
    ///
    /// On timeout the caller gets [`FetchOutcome::Timeout`] while the fetch
    /// keeps running; its result is cached when it lands.
    pub async fn request(&self, key: FetchKey, timeout: Duration) -> FetchOutcome {
        let span = tracing::info_span!("quote_request", request_id = %Uuid::new_v4(), key = %key);
        self.dispatch(key, timeout).instrument(span).await
    }

    async fn dispatch(&self, key: FetchKey, timeout: Duration) -> FetchOutcome {
        if let Some(entry) = self.shared.cache.get(&key) {
            tracing::debug!("cache hit");
            return FetchOutcome::Success(Arc::clone(entry.result()));
        }
        tracing::debug!("cache miss");

        let mut published = match self.subscribe(&key) {
            Subscription::Cached(result) => return FetchOutcome::Success(result),
            Subscription::Waiting(published) => published,
        };

        match tokio::time::timeout(timeout, wait_for_outcome(&mut published)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "request timed out, fetch continues in the background"
                );
                FetchOutcome::Timeout(TimeoutStage::Dispatch)
            }
        }
    }

    fn subscribe(&self, key: &FetchKey) -> Subscription {
        if !self.config.single_flight {
            let (tx, rx) = watch::channel(None);
            self.spawn_fetch(key.clone(), tx, None);
            return Subscription::Waiting(rx);
        }

        let mut in_flight = self.shared.lock_in_flight();
        if let Some(existing) = in_flight.get(key) {
            // A closed sender means the task died without cleaning up.
            if existing.outcome.has_changed().is_ok() {
                tracing::debug!("joining in-flight fetch");
                return Subscription::Waiting(existing.outcome.clone());
            }
            tracing::debug!("replacing abandoned in-flight fetch");
        }

        // A fetch may have completed between the first lookup and the lock.
        if let Some(entry) = self.shared.cache.get(key) {
            return Subscription::Cached(Arc::clone(entry.result()));
        }

        let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        in_flight.insert(
            key.clone(),
            InFlight {
                generation,
                outcome: rx.clone(),
            },
        );
        drop(in_flight);

        self.spawn_fetch(key.clone(), tx, Some(generation));
        Subscription::Waiting(rx)
    }

    fn spawn_fetch(
        &self,
        key: FetchKey,
        tx: watch::Sender<Option<FetchOutcome>>,
        generation: Option<u64>,
    ) {
        let shared = Arc::clone(&self.shared);
        let span = tracing::Span::current();
        tokio::spawn(
            async move {
                let outcome = shared.run_fetch(&key).await;
                // Unregister before publishing so no later request can join a
                // finished fetch.
                if let Some(generation) = generation {
                    shared.forget(&key, generation);
                }
                tx.send_replace(Some(outcome));
            }
            .instrument(span),
        );
    }

    /// Closes the pool. Fetches still waiting for a worker resolve to
    /// `UpstreamError(PoolClosed)`; running fetches finish normally.
    pub fn shutdown(&self) {
        tracing::info!("dispatch pool shutting down");
        self.shared.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.permits.is_closed()
    }

    /// Number of upstream fetches that obtained a worker so far.
    pub fn fetches_started(&self) -> u64 {
        self.shared.fetches_started.load(Ordering::SeqCst)
    }

    /// Keys with a shared fetch currently registered.
    pub fn in_flight(&self) -> usize {
        self.shared.lock_in_flight().len()
    }

    pub fn available_workers(&self) -> usize {
        self.shared.permits.available_permits()
    }

    pub fn cache(&self) -> &Arc<QuoteCache> {
        &self.shared.cache
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }
}

impl PoolShared {
    async fn run_fetch(&self, key: &FetchKey) -> FetchOutcome {
        let permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!("pool closed before a worker was assigned");
                return FetchOutcome::UpstreamError(UpstreamFailure::pool_closed());
            }
        };

        self.fetches_started.fetch_add(1, Ordering::SeqCst);
        let outcome = self.fetcher.fetch(key).await;
        drop(permit);

        if let FetchOutcome::Success(result) = &outcome {
            self.cache
                .put(key.clone(), Arc::clone(result), self.cache.default_ttl());
            tracing::info!(bars = result.bars().len(), "fetch completed and cached");
        }
        outcome
    }

    fn forget(&self, key: &FetchKey, generation: u64) {
        let mut in_flight = self.lock_in_flight();
        if in_flight
            .get(key)
            .is_some_and(|entry| entry.generation == generation)
        {
            in_flight.remove(key);
        }
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<FetchKey, InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn wait_for_outcome(published: &mut Published) -> FetchOutcome {
    let outcome = match published.wait_for(Option::is_some).await {
        Ok(value) => value.clone(),
        Err(_) => None,
    };

    outcome.unwrap_or_else(|| {
        tracing::warn!("fetch task ended without publishing an outcome");
        FetchOutcome::UpstreamError(UpstreamFailure::abandoned())
    })
}
