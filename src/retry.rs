//! Retry logic with exponential backoff
//!
//! Used by the supervisor between connect-and-join attempts. Feed calls are
//! never retried: a failed poll is simply skipped until the next cycle.
//!
//! # Example
//!
//! ```
//! use feedbridge::config::RetryConfig;
//! use feedbridge::retry::Backoff;
//! use std::time::Duration;
//!
//! let config = RetryConfig {
//!     max_attempts: 3,
//!     initial_delay: Duration::from_secs(1),
//!     max_delay: Duration::from_secs(3),
//!     backoff_multiplier: 2.0,
//!     jitter: false,
//! };
//! let mut backoff = Backoff::new(&config);
//! assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
//! assert_eq!(backoff.next_delay(), Some(Duration::from_secs(2)));
//! assert_eq!(backoff.next_delay(), Some(Duration::from_secs(3)));
//! assert_eq!(backoff.next_delay(), None);
//! ```

use crate::config::RetryConfig;
use crate::error::TransportError;
use rand::Rng;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (refused connection, dropped socket) should return `true`.
/// Permanent failures (nickname rejected, bad configuration) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for TransportError {
    fn is_retryable(&self) -> bool {
        match self {
            TransportError::ConnectionLost(_) | TransportError::ConnectFailed { .. } => true,
            TransportError::NotConnected => true,
            TransportError::Registration(_) | TransportError::SendFailed { .. } => false,
        }
    }
}

/// Delay schedule for successive retries of one operation
///
/// Starts at `initial_delay`, multiplies by `backoff_multiplier` after every
/// attempt, never exceeds `max_delay`, and hands out at most `max_attempts`
/// delays. With `jitter` enabled each delay is stretched by up to 100%.
#[derive(Clone, Debug)]
pub struct Backoff {
    config: RetryConfig,
    attempt: u32,
    delay: Duration,
}

impl Backoff {
    /// Fresh schedule for `config`
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            config: config.clone(),
            attempt: 0,
            delay: config.initial_delay,
        }
    }

    /// Delay to wait before the next attempt, or `None` once the retry budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.max_attempts {
            return None;
        }
        self.attempt += 1;

        let max_delay = self.config.max_delay;
        let current = self.delay.min(max_delay);
        let next = Duration::try_from_secs_f64(current.as_secs_f64() * self.config.backoff_multiplier)
            .unwrap_or(max_delay);
        self.delay = next.min(max_delay);

        Some(if self.config.jitter {
            add_jitter(current, max_delay)
        } else {
            current
        })
    }

    /// Delay to keep using once the budget is spent: `max_delay`, jittered if enabled
    pub fn ceiling(&self) -> Duration {
        let max_delay = self.config.max_delay;
        if self.config.jitter {
            add_jitter(max_delay, max_delay)
        } else {
            max_delay
        }
    }

    /// Retries handed out so far
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Retry budget from the configuration
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

/// Stretch `delay` by a random factor in `[1, 2]`
///
/// Falls back to `fallback` if the result is not representable.
fn add_jitter(delay: Duration, fallback: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor)).unwrap_or(fallback)
}
