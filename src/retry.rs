//! Retry logic with exponential backoff
//!
//! Raw HTTP transfers run on worker threads, so retries block the calling thread
//! between attempts. Delays grow exponentially up to a cap, with optional jitter.
//!
//! # Example
//!
//! ```no_run
//! use audiobook_provisioner::retry::{IsRetryable, with_retry};
//! use audiobook_provisioner::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! let config = RetryConfig::default();
//! let result = with_retry(&config, || Ok::<_, MyError>(42));
//! assert_eq!(result.unwrap(), 42);
//! ```

use crate::config::RetryConfig;
use crate::error::{DownloadError, Error};
use rand::Rng;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, refused connections, server busy) return `true`.
/// Permanent failures (not found, disk full, corrupt archive) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // 5xx and 429 are the server asking us to come back later
            Error::Download(DownloadError::HttpStatus { status, .. }) => {
                *status >= 500 || *status == 429
            }
            Error::Download(_) => false,
            Error::Mail(msg) => msg.contains("timeout") || msg.contains("temporary"),
            Error::Config { .. }
            | Error::Install(_)
            | Error::Script(_)
            | Error::Zip(_)
            | Error::Serialization(_)
            | Error::NotFound(_)
            | Error::NotSupported(_)
            | Error::Other(_) => false,
        }
    }
}

/// Run `operation`, retrying transient failures with exponential backoff
///
/// At most `config.max_attempts` retries follow the first attempt. Returns the
/// successful result or the last error.
pub fn with_retry<F, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation() {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "operation failed, retrying"
                );

                let wait = if config.jitter { add_jitter(delay) } else { delay };
                std::thread::sleep(wait);

                delay = next_delay(delay, config);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "operation failed after all retry attempts"
                    );
                } else {
                    tracing::error!(error = %e, "operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

fn next_delay(delay: Duration, config: &RetryConfig) -> Duration {
    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier).min(config.max_delay)
}

/// Stretch `delay` by a random factor between 1 and 2
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}
