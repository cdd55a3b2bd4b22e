//! Array settings
//!
//! Configure how indexed arrays resolve keys against their data source.

use rand::Rng;
use std::time::Duration;

/// Settings for configuring array behavior
///
/// # Example
/// ```
/// use firebase_ui_rust::common::ArraySettings;
/// use std::time::Duration;
///
/// let settings = ArraySettings::new()
///     .with_max_fetch_attempts(5)
///     .with_initial_retry_delay(Duration::from_millis(50));
/// assert_eq!(settings.max_fetch_attempts, 5);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ArraySettings {
    /// Maximum number of one-shot fetch attempts per key before the key is
    /// reported as failed
    ///
    /// Default: 3
    pub max_fetch_attempts: u32,

    /// Delay before the first retry; doubled for each further retry
    ///
    /// Default: 250 ms
    pub initial_retry_delay: Duration,

    /// Upper bound for the retry delay
    ///
    /// Default: 5 s
    pub max_retry_delay: Duration,

    /// Whether to add up to 50% random jitter to each retry delay
    ///
    /// Default: true
    pub retry_jitter: bool,
}

impl Default for ArraySettings {
    fn default() -> Self {
        Self {
            max_fetch_attempts: Self::DEFAULT_MAX_FETCH_ATTEMPTS,
            initial_retry_delay: Duration::from_millis(250),
            max_retry_delay: Duration::from_secs(5),
            retry_jitter: true,
        }
    }
}

impl ArraySettings {
    /// Default number of fetch attempts per key
    pub const DEFAULT_MAX_FETCH_ATTEMPTS: u32 = 3;

    /// Creates default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of fetch attempts (at least one attempt is always made)
    pub fn with_max_fetch_attempts(mut self, attempts: u32) -> Self {
        self.max_fetch_attempts = attempts.max(1);
        self
    }

    /// Set the delay before the first retry
    pub fn with_initial_retry_delay(mut self, delay: Duration) -> Self {
        self.initial_retry_delay = delay;
        self
    }

    /// Set the upper bound for retry delays
    pub fn with_max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = delay;
        self
    }

    /// Enable or disable retry jitter
    pub fn with_retry_jitter(mut self, jitter: bool) -> Self {
        self.retry_jitter = jitter;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self
            .initial_retry_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_retry_delay);

        if !self.retry_jitter || base.is_zero() {
            return base;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2);
        base + Duration::from_millis(jitter_ms)
    }
}
