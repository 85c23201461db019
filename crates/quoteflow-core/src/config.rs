//! Pipeline configuration with environment overrides.
//!
//! # Environment Variables
//!
//! | Setting | Env Var | Default |
//! |---------|---------|---------|
//! | Cache capacity | `QUOTEFLOW_CACHE_CAPACITY` | 500 |
//! | Cache TTL | `QUOTEFLOW_CACHE_TTL_SECS` | 300 |
//! | Worker count | `QUOTEFLOW_WORKERS` | 10 |
//! | Fetch timeout | `QUOTEFLOW_FETCH_TIMEOUT_MS` | 5000 |
//! | Normalize timeout | `QUOTEFLOW_NORMALIZE_TIMEOUT_MS` | 3000 |
//! | Upstream attempts | `QUOTEFLOW_MAX_ATTEMPTS` | 2 |
//! | Backoff base | `QUOTEFLOW_BACKOFF_FACTOR_MS` | 500 |
//! | Single-flight | `QUOTEFLOW_SINGLE_FLIGHT` | true |
//! | Stock list | `QUOTEFLOW_STOCK_LIST_PATH`, then `STOCK_LIST_PATH` | unset |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::cache::CacheConfig;
use crate::dispatch::DispatchConfig;
use crate::error::ConfigError;
use crate::fetcher::DEFAULT_NORMALIZE_TIMEOUT;
use crate::retry::{Backoff, RetryPolicy};

/// Everything needed to assemble a [`QuoteService`](crate::QuoteService).
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub cache: CacheConfig,
    pub retry: RetryPolicy,
    pub dispatch: DispatchConfig,
    pub normalize_timeout: Duration,
    pub stock_list_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            retry: RetryPolicy::default(),
            dispatch: DispatchConfig::default(),
            normalize_timeout: DEFAULT_NORMALIZE_TIMEOUT,
            stock_list_path: None,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `QUOTEFLOW_*` process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(capacity) = parse_var::<usize, _>(&lookup, "QUOTEFLOW_CACHE_CAPACITY")? {
            config.cache.capacity = capacity;
        }
        if let Some(secs) = parse_positive(&lookup, "QUOTEFLOW_CACHE_TTL_SECS")? {
            config.cache.ttl = Duration::from_secs(secs);
        }
        if let Some(workers) = parse_positive(&lookup, "QUOTEFLOW_WORKERS")? {
            config.dispatch.workers = usize::try_from(workers)
                .ok()
                .filter(|&workers| workers <= Semaphore::MAX_PERMITS)
                .ok_or_else(|| ConfigError::InvalidValue {
                    var: "QUOTEFLOW_WORKERS",
                    value: workers.to_string(),
                    reason: "exceeds the maximum worker count",
                })?;
        }
        if let Some(ms) = parse_positive(&lookup, "QUOTEFLOW_FETCH_TIMEOUT_MS")? {
            config.dispatch.fetch_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_positive(&lookup, "QUOTEFLOW_NORMALIZE_TIMEOUT_MS")? {
            config.normalize_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_positive(&lookup, "QUOTEFLOW_MAX_ATTEMPTS")? {
            config.retry.max_attempts = u32::try_from(attempts).map_err(|_| ConfigError::InvalidValue {
                var: "QUOTEFLOW_MAX_ATTEMPTS",
                value: attempts.to_string(),
                reason: "too large",
            })?;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "QUOTEFLOW_BACKOFF_FACTOR_MS")? {
            config.retry.backoff = Backoff::doubling(Duration::from_millis(ms));
        }
        if let Some(value) = lookup("QUOTEFLOW_SINGLE_FLIGHT") {
            config.dispatch.single_flight = parse_bool("QUOTEFLOW_SINGLE_FLIGHT", &value)?;
        }

        config.stock_list_path = lookup("QUOTEFLOW_STOCK_LIST_PATH")
            .or_else(|| lookup("STOCK_LIST_PATH"))
            .map(PathBuf::from);

        Ok(config)
    }
}

fn parse_var<T, L>(lookup: &L, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|value| {
            value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
                var,
                value,
                reason: "not a non-negative integer",
            })
        })
        .transpose()
}

fn parse_positive<L>(lookup: &L, var: &'static str) -> Result<Option<u64>, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    match parse_var::<u64, _>(lookup, var)? {
        Some(0) => Err(ConfigError::InvalidValue {
            var,
            value: String::from("0"),
            reason: "must be greater than zero",
        }),
        other => Ok(other),
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_owned(),
            reason: "expected true or false",
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |var: &str| vars.get(var).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let config = PipelineConfig::from_lookup(lookup(&[])).expect("defaults");
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.cache.capacity, 500);
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.dispatch.workers, 10);
        assert_eq!(config.dispatch.fetch_timeout, Duration::from_secs(5));
        assert_eq!(config.normalize_timeout, Duration::from_secs(3));
        assert_eq!(config.retry.attempts(), 2);
        assert!(config.dispatch.single_flight);
    }

    #[test]
    fn overrides_are_applied() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("QUOTEFLOW_CACHE_CAPACITY", "0"),
            ("QUOTEFLOW_CACHE_TTL_SECS", "60"),
            ("QUOTEFLOW_WORKERS", "4"),
            ("QUOTEFLOW_FETCH_TIMEOUT_MS", "1500"),
            ("QUOTEFLOW_NORMALIZE_TIMEOUT_MS", "250"),
            ("QUOTEFLOW_MAX_ATTEMPTS", "3"),
            ("QUOTEFLOW_BACKOFF_FACTOR_MS", "100"),
            ("QUOTEFLOW_SINGLE_FLIGHT", "off"),
            ("STOCK_LIST_PATH", "/srv/stocks.json"),
        ]))
        .expect("valid overrides");

        assert_eq!(config.cache.capacity, 0);
        assert_eq!(config.cache.ttl, Duration::from_secs(60));
        assert_eq!(config.dispatch.workers, 4);
        assert_eq!(config.dispatch.fetch_timeout, Duration::from_millis(1500));
        assert_eq!(config.normalize_timeout, Duration::from_millis(250));
        assert_eq!(config.retry.attempts(), 3);
        assert_eq!(config.retry.delay_for_attempt(1), Duration::from_millis(200));
        assert!(!config.dispatch.single_flight);
        assert_eq!(config.stock_list_path, Some(PathBuf::from("/srv/stocks.json")));
    }

    #[test]
    fn prefixed_stock_list_path_wins() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("QUOTEFLOW_STOCK_LIST_PATH", "a.json"),
            ("STOCK_LIST_PATH", "b.json"),
        ]))
        .expect("valid");
        assert_eq!(config.stock_list_path, Some(PathBuf::from("a.json")));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = PipelineConfig::from_lookup(lookup(&[("QUOTEFLOW_WORKERS", "many")]))
            .expect_err("not a number");
        assert!(matches!(err, ConfigError::InvalidValue { var: "QUOTEFLOW_WORKERS", .. }));

        let err = PipelineConfig::from_lookup(lookup(&[("QUOTEFLOW_CACHE_TTL_SECS", "0")]))
            .expect_err("zero ttl");
        assert!(err.to_string().contains("greater than zero"));

        let err = PipelineConfig::from_lookup(lookup(&[("QUOTEFLOW_SINGLE_FLIGHT", "maybe")]))
            .expect_err("not a bool");
        assert!(matches!(err, ConfigError::InvalidValue { var: "QUOTEFLOW_SINGLE_FLIGHT", .. }));
    }

    #[test]
    fn worker_count_above_semaphore_limit_is_rejected() {
        let err = PipelineConfig::from_lookup(lookup(&[("QUOTEFLOW_WORKERS", "18446744073709551615")]))
            .expect_err("too many workers");
        assert!(matches!(err, ConfigError::InvalidValue { var: "QUOTEFLOW_WORKERS", .. }));

        let limit = Semaphore::MAX_PERMITS.to_string();
        let config = PipelineConfig::from_lookup(lookup(&[("QUOTEFLOW_WORKERS", limit.as_str())]))
            .expect("limit itself is allowed");
        assert_eq!(config.dispatch.workers, Semaphore::MAX_PERMITS);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = PipelineConfig::from_lookup(lookup(&[("QUOTEFLOW_WORKERS", "  ")])).expect("blank");
        assert_eq!(config.dispatch.workers, 10);
    }
}
