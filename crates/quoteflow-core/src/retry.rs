//! Retry policy with exponential backoff.

use std::time::Duration;

/// Backoff strategy between upstream attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Uses an exponential delay between retries.
    ///
    /// The delay is calculated as `base * (factor ^ attempt)`.
    Exponential {
        /// The delay after the first attempt.
        base: Duration,
        /// The multiplicative factor for each subsequent retry.
        factor: f64,
        /// The maximum duration to wait between retries.
        max: Duration,
        /// Whether to apply random jitter (+/- 50%) to the delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::doubling(Duration::from_millis(500))
    }
}

impl Backoff {
    /// Exact doubling from `base`, no jitter.
    pub fn doubling(base: Duration) -> Self {
        Self::Exponential {
            base,
            factor: 2.0,
            max: Duration::from_secs(30),
            jitter: false,
        }
    }

    /// Calculate the delay that follows a failed attempt.
    ///
    /// `attempt` is 0-based. Each delay is derived from the base alone, so a
    /// schedule never drifts.
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let capped_seconds = seconds.min(max.as_secs_f64());

                let mut delay = Duration::from_secs_f64(capped_seconds);

                if jitter {
                    let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
                    let random_offset = fastrand::u64(0..=(jitter_ms * 2));
                    let total_ms =
                        delay.as_millis() as i64 + (random_offset as i64 - jitter_ms as i64);
                    delay = Duration::from_millis(total_ms.max(0) as u64);
                }

                delay
            }
        }
    }
}

/// How many times the fetcher calls upstream, and how long it waits between
/// calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total upstream calls per fetch, including the first. Values below 1
    /// are treated as 1.
    pub max_attempts: u32,
    /// The backoff strategy to use between attempts.
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` calls with exact doubling from `backoff_factor`.
    pub fn exponential(max_attempts: u32, backoff_factor: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::doubling(backoff_factor),
        }
    }

    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { delay },
        }
    }

    /// A single attempt, never waits.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn is_final_attempt(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) >= self.attempts()
    }

    /// Delay to wait after attempt `attempt` (0-based) before the next one.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}
