//! Shared fixtures for the behavior tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quoteflow_core::{FetchKey, ProviderError, QuoteProvider, RawRow};

pub type Step = Result<Vec<RawRow>, ProviderError>;

/// Provider that counts calls and replays a script. Once the script is down
/// to its last step, that step repeats forever.
pub struct CountingProvider {
    calls: AtomicUsize,
    latency: Duration,
    script: Mutex<VecDeque<Step>>,
}

impl CountingProvider {
    pub fn scripted(steps: Vec<Step>) -> Self {
        assert!(!steps.is_empty(), "script needs at least one step");
        Self {
            calls: AtomicUsize::new(0),
            latency: Duration::ZERO,
            script: Mutex::new(steps.into()),
        }
    }

    pub fn returning(rows: Vec<RawRow>) -> Self {
        Self::scripted(vec![Ok(rows)])
    }

    pub fn failing(message: &str) -> Self {
        Self::scripted(vec![Err(ProviderError::new(message))])
    }

    /// Every download blocks its worker thread for `latency`.
    pub fn slow(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl QuoteProvider for CountingProvider {
    fn download(&self, _key: &FetchKey) -> Step {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        let mut script = self.script.lock().expect("script lock");
        if script.len() > 1 {
            script.pop_front().expect("non-empty script")
        } else {
            script.front().cloned().expect("non-empty script")
        }
    }
}

/// `count` well-formed ascending daily rows starting 2024-01-02.
pub fn daily_rows(count: usize) -> Vec<RawRow> {
    (0..count)
        .map(|offset| {
            let price = 100.0 + offset as f64;
            RawRow::numeric(
                &format!("2024-01-{:02}", offset + 2),
                price,
                price + 1.0,
                price - 1.0,
                price + 0.5,
                1_000 * (offset as u64 + 1),
            )
        })
        .collect()
}

pub fn key(symbol: &str, interval: &str, period: &str) -> FetchKey {
    FetchKey::parse(symbol, interval, period).expect("valid fetch key")
}
