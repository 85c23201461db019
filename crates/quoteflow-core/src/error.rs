use std::path::PathBuf;

use thiserror::Error;

/// Validation errors for fetch keys and timestamps.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter or '^': '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid interval '{value}', expected one of 1m, 2m, 5m, 15m, 30m, 60m, 90m, 1h, 1d, 5d, 1wk, 1mo, 3mo")]
    InvalidInterval { value: String },
    #[error("invalid period '{value}', expected ytd, max or <N>d/wk/mo/y")]
    InvalidPeriod { value: String },

    #[error("timestamp is not parseable as a UTC instant: '{value}'")]
    InvalidTimestamp { value: String },
}

/// Errors raised while reading pipeline configuration from the environment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {var}='{value}' is invalid: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Errors raised while loading the curated symbol list.
#[derive(Debug, Error)]
pub enum SymbolListError {
    #[error("no symbol list path configured")]
    NotConfigured,

    #[error("failed to read symbol list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("symbol list {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("symbol list entry {index} is invalid: {source}")]
    Entry {
        index: usize,
        #[source]
        source: ValidationError,
    },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    SymbolList(#[from] SymbolListError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
