//! # Quoteflow Core
//!
//! Concurrent fetch-cache-retry pipeline for OHLCV quote series.
//!
//! ## Overview
//!
//! A request names a symbol, an interval and a period. The pipeline answers
//! it from an in-memory cache when it can, and otherwise runs a bounded,
//! retrying upstream fetch whose normalized result is cached for later
//! callers:
//!
//! - **Quote cache** with per-entry TTL and LRU eviction
//! - **Retrying fetcher** with exponential backoff over a blocking provider
//! - **Dispatch pool** with a fixed number of workers and per-request timeouts
//! - **Bar normalizer** turning loosely typed rows into canonical bars
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | TTL + LRU quote cache |
//! | [`clock`] | Injectable clock and sleeper |
//! | [`config`] | Pipeline configuration and env overrides |
//! | [`dispatch`] | Bounded worker pool with single-flight |
//! | [`domain`] | Keys, bars, series, timestamps |
//! | [`error`] | Core error types |
//! | [`fetcher`] | Retrying upstream fetcher |
//! | [`normalize`] | Raw row to bar conversion |
//! | [`outcome`] | Fetch outcomes and response mapping |
//! | [`retry`] | Retry policy and backoff |
//! | [`service`] | Caller-facing service |
//! | [`symbols`] | Curated symbol list |
//! | [`upstream`] | Provider trait and raw rows |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quoteflow_core::{FetchKey, ProviderError, QuoteServiceBuilder, RawRow};
//!
//! #[tokio::main]
//! async fn main() {
//!     let provider = |key: &FetchKey| -> Result<Vec<RawRow>, ProviderError> {
//!         my_feed::download(key.symbol().as_str(), key.interval().as_str(), key.period().as_str())
//!     };
//!     let service = QuoteServiceBuilder::new(provider).build();
//!
//!     let response = service.respond("AAPL", "1d", "1mo", 0).await.unwrap();
//!     println!("{} {}", response.status, response.body);
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  QuoteService   │  validate, map outcome to status
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Dispatch Pool  │────▶│   Quote Cache    │
//! └────────┬────────┘     └──────────────────┘
//!          │ miss
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Retrying Fetcher│────▶│ QuoteProvider    │
//! └────────┬────────┘     │ (blocking)       │
//!          │              └──────────────────┘
//!          ▼
//! ┌─────────────────┐
//! │ Bar Normalizer  │
//! └─────────────────┘
//! ```
//!
//! ## Logging
//!
//! The crate emits `tracing` events and spans but never installs a
//! subscriber. Upstream error text is logged and never returned to callers.

pub mod cache;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod normalize;
pub mod outcome;
pub mod retry;
pub mod service;
pub mod symbols;
pub mod upstream;

// Caching
pub use cache::{CacheConfig, CacheEntry, QuoteCache};

// Time sources
pub use clock::{Clock, ManualClock, RecordingSleeper, SleepFuture, Sleeper, SystemClock, TokioSleeper};

// Configuration
pub use config::PipelineConfig;

// Dispatch
pub use dispatch::{DispatchConfig, DispatchPool};

// Domain models
pub use domain::{Bar, FetchKey, Interval, Period, QuoteResult, Series, SeriesPayload, Symbol, UtcDateTime};

// Error types
pub use error::{ConfigError, CoreError, SymbolListError, ValidationError};

// Fetching
pub use fetcher::{RetryingFetcher, DEFAULT_NORMALIZE_TIMEOUT};

// Normalization
pub use normalize::{BarNormalizer, NormalizeError, RowDefect};

// Outcomes
pub use outcome::{FetchOutcome, QuoteResponse, TimeoutStage, UpstreamFailure, UpstreamFailureKind};

// Retry logic
pub use retry::{Backoff, RetryPolicy};

// Service boundary
pub use service::{QuoteService, QuoteServiceBuilder};

// Symbol list
pub use symbols::{load_symbol_list, ListedSymbol};

// Upstream contract
pub use upstream::{ProviderError, QuoteProvider, RawRow};
