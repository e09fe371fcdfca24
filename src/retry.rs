// SPDX-License-Identifier: MIT
//! Bounded exponential backoff for forge and git calls.
//!
//! Provides [`retry_with_backoff`] — retries a fallible async operation with
//! exponentially increasing delays, but only for errors the caller classifies
//! as transient. A rate-limited or flaky-network forge call gets another
//! chance; a 404 or a bad credential fails immediately.

use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for [`retry_with_backoff`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first try).
    ///
    /// Default: 3
    pub max_attempts: u32,
    /// Delay before the second attempt; each subsequent delay is multiplied
    /// by `multiplier`.
    ///
    /// Default: 500 ms
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    ///
    /// Default: 30 s
    pub max_delay: Duration,
    /// Multiplier applied to the previous delay on each retry.
    ///
    /// Default: 2.0
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Config suitable for quick unit tests (no real waiting).
    pub fn instant() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// Calls `f()` up to `config.max_attempts` times. After a failure that
/// `is_transient` accepts, waits for the backoff delay and tries again; an
/// error `is_transient` rejects is returned immediately, whatever the
/// attempt count. Returns the first success or the last error.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    mut is_transient: impl FnMut(&E) -> bool,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
{
    assert!(
        config.max_attempts > 0,
        "RetryConfig.max_attempts must be at least 1"
    );

    let mut delay = config.initial_delay;
    let mut last_err: Option<E> = None;

    for attempt in 1..=config.max_attempts {
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "retry succeeded");
                }
                return Ok(value);
            }
            Err(e) if !is_transient(&e) => {
                debug!(attempt, err = ?e, "non-transient error — not retrying");
                return Err(e);
            }
            Err(e) => {
                if attempt < config.max_attempts {
                    warn!(
                        attempt,
                        max = config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        err = ?e,
                        "transient failure — retrying"
                    );
                    tokio::time::sleep(delay).await;
                    let next_ms = (delay.as_millis() as f64 * config.multiplier) as u128;
                    delay = Duration::from_millis(next_ms.min(config.max_delay.as_millis()) as u64);
                } else {
                    warn!(attempt, max = config.max_attempts, err = ?e, "all retry attempts exhausted");
                    last_err = Some(e);
                }
            }
        }
    }

    // The loop always assigns last_err when all attempts fail.
    Err(last_err.expect("retry loop ended without setting last_err"))
}
