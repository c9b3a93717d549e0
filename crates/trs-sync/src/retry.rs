//! Bounded exponential retry
//!
//! A [`RetryPolicy`] describes how often and how patiently an operation is
//! retried; [`retry`] and [`retry_notify`] run an async operation under a
//! policy. Only errors that report themselves as transient through
//! [`Retryable`] are retried; anything else is returned at once.
//!
//! Delays grow as `base_delay * multiplier^(n-1)` for the n-th retry, are
//! capped at `max_delay`, and with jitter enabled are drawn uniformly from
//! the upper half of that value. A server-provided delay
//! ([`Retryable::retry_after`]) replaces the computed one, still capped at
//! `max_delay`.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};
use trs_core::config::RetryConfig;
use trs_core::ports::{FeedError, SinkError, StoreError};

/// Errors that know whether repeating the operation may help
pub trait Retryable {
    fn is_transient(&self) -> bool;

    /// Delay requested by the other side, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for FeedError {
    fn is_transient(&self) -> bool {
        FeedError::is_transient(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        FeedError::retry_after(self)
    }
}

impl Retryable for SinkError {
    fn is_transient(&self) -> bool {
        SinkError::is_transient(self)
    }
}

impl Retryable for StoreError {
    fn is_transient(&self) -> bool {
        StoreError::is_transient(self)
    }
}

/// Exponential backoff parameters for one retry site
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    max_attempts: u32,
    jitter: bool,
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` counts the first attempt and is at least 1
    pub fn new(
        base_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
        max_attempts: u32,
        jitter: bool,
    ) -> Self {
        Self {
            base_delay,
            multiplier: multiplier.max(1.0),
            max_delay: max_delay.max(base_delay),
            max_attempts: max_attempts.max(1),
            jitter,
        }
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self::new(Duration::ZERO, 1.0, Duration::ZERO, 1, false)
    }

    /// Same policy with jitter disabled
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the `retry`-th retry (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let exp = self.multiplier.powi(retry.saturating_sub(1).min(i32::MAX as u32) as i32);
        let raw = self.base_delay.as_secs_f64() * exp;
        let capped = if raw.is_finite() {
            Duration::from_secs_f64(raw.min(self.max_delay.as_secs_f64()))
        } else {
            self.max_delay
        };

        if self.jitter && !capped.is_zero() {
            let millis = capped.as_millis() as u64;
            Duration::from_millis(rand::thread_rng().gen_range(millis / 2..=millis))
        } else {
            capped
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            config.multiplier,
            Duration::from_millis(config.max_delay_ms),
            config.max_attempts,
            config.jitter,
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// Runs `operation` under `policy`
///
/// Returns the first success, the first non-transient error, or the last
/// error once the attempt budget is spent.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, operation: &str, f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    retry_notify(policy, operation, f, |_, _, _| {}).await
}

/// Like [`retry`], calling `notify(retry, &error, delay)` before each wait
pub async fn retry_notify<T, E, F, Fut, N>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: F,
    mut notify: N,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
    N: FnMut(u32, &E, Duration),
{
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = err
                    .retry_after()
                    .map(|d| d.min(policy.max_delay))
                    .unwrap_or_else(|| policy.delay_for(attempt));
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient error, retrying"
                );
                notify(attempt, &err, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_transient() {
                    warn!(operation, attempts = attempt, error = %err, "Retry budget exhausted");
                }
                return Err(err);
            }
        }
    }
}
