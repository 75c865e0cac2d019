//! Retry utilities with exponential backoff.
//!
//! Provides retry logic for batch-level failures using the `backon` crate.
//! Delays are deterministic by default: `initial, initial·factor,
//! initial·factor², …`, capped at `max_delay`.
//!
//! # Example
//!
//! ```rust,ignore
//! use metasync::reliability::{retry_async, RetryConfig};
//!
//! let result = retry_async(
//!     &RetryConfig::default(),
//!     "collision probe",
//!     || async { probe.probe(owner, &names).await },
//!     |e| e.is_retryable(),
//! ).await;
//! ```

use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (2.0 doubles delay each retry).
    pub factor: f32,
    /// Randomize delays to spread out concurrent retries.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            factor: 2.0,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Set total number of attempts. Values below 1 are treated as 1.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Attempts actually made, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Sleep schedule between attempts when jitter is off.
    pub fn delays(&self) -> Vec<Duration> {
        let mut delays = Vec::new();
        let mut delay = self.initial_delay;
        for _ in 1..self.attempts() {
            delays.push(delay.min(self.max_delay));
            delay = Duration::from_secs_f32(delay.as_secs_f32() * self.factor);
        }
        delays
    }

    /// Build the exponential backoff strategy.
    fn build_backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay.max(self.initial_delay))
            .with_max_times((self.attempts() - 1) as usize)
            .with_factor(self.factor);
        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// # Arguments
///
/// * `config` - Retry configuration
/// * `operation_name` - Name for logging
/// * `operation` - The async operation to retry
/// * `is_retryable` - Predicate selecting errors worth another attempt
///
/// # Returns
///
/// The result of the operation, or the last error once attempts run out or
/// a non-retryable error occurs.
pub async fn retry_async<F, Fut, T, E, R>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
    is_retryable: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let backoff = config.build_backoff();
    let max_attempts = config.attempts();

    let mut attempt = 0u32;
    let notify = |err: &E, dur: Duration| {
        attempt += 1;
        warn!(
            operation = %operation_name,
            attempt = attempt,
            max_attempts = max_attempts,
            next_delay_ms = dur.as_millis() as u64,
            error = %err,
            "Attempt failed, will retry"
        );
    };

    let result = operation
        .retry(backoff)
        .when(move |e| is_retryable(e))
        .notify(notify)
        .await;

    if result.is_ok() {
        debug!(operation = %operation_name, "Operation succeeded");
    }
    result
}
