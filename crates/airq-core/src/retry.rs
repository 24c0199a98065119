//! Retry logic for remote API calls.
//!
//! The sync pipeline treats the remote network as unreliable: connection
//! errors, timeouts, undecodable bodies and 5xx answers are retried a bounded
//! number of times, then the last error is propagated.
//!
//! # Example
//!
//! ```
//! use airq_core::{Error, RetryConfig, with_retry};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Error> {
//! // 3 retries after the first attempt, 1 s apart
//! let config = RetryConfig::fixed(3, Duration::from_secs(1));
//!
//! let sites = with_retry(&config, "ListSensors", None, || async {
//!     Ok::<_, Error>(42)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first (0 means no retries).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Backoff multiplier (1.0 = constant delay, 2.0 = double each time).
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% random jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    /// Three retries with a fixed one-second pause.
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }
}

impl RetryConfig {
    /// Constant pause between attempts, no jitter.
    pub fn fixed(max_retries: u32, pause: Duration) -> Self {
        Self {
            max_retries,
            initial_delay: pause,
            max_delay: pause,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Exponential backoff starting at `initial_delay`, doubling up to 30 s,
    /// with jitter.
    pub fn exponential(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// No retries.
    pub fn none() -> Self {
        Self::fixed(0, Duration::ZERO)
    }

    /// Set maximum number of retries.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set initial delay.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Calculate delay for a given attempt number.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.jitter {
            let jitter_factor = 1.0 + (rand::rng().random::<f64>() * 0.25);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}

/// Execute an async operation with retry logic.
///
/// Only errors for which [`Error::is_transient`] holds are retried; anything
/// else is returned immediately. When `cancel` is given, cancellation is
/// checked before every retry and interrupts the pause between attempts,
/// returning [`Error::Cancelled`].
///
/// Returns the result of the operation, or the last error once
/// `config.max_retries` retries are used up.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    cancel: Option<&CancellationToken>,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(Error::Cancelled);
        }

        let error = match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("{} succeeded after {} retries", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(e) => e,
        };

        if !error.is_transient() || attempt >= config.max_retries {
            return Err(error);
        }

        let delay = config.delay_for_attempt(attempt);
        warn!(
            "{} failed (attempt {}/{}): {}; retrying in {:?}",
            operation_name,
            attempt + 1,
            config.max_retries + 1,
            error,
            delay
        );

        match cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => return Err(Error::Cancelled),
                    _ = sleep(delay) => {}
                }
            }
            None => sleep(delay).await,
        }

        attempt += 1;
    }
}
