//! Bounded fixed-delay retry for REST calls.
//!
//! Every controller call shares one [`RetryPolicy`]. Waits between
//! attempts observe the [`CancellationToken`] so shutdown is never held
//! up by a retry in progress.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// How many times to try and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Treated as at least one.
    pub max_attempts: u32,
    /// Fixed wait between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Why a retried operation did not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    #[error("{operation} failed after {attempts} attempts: {last}")]
    Exhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        last: E,
    },

    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },
}

impl RetryPolicy {
    /// Run `f` until it succeeds, attempts run out, or `cancel` fires.
    pub async fn run<T, E, F, Fut>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        mut f: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled { operation }),
                result = f() => result,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max_attempts => {
                    tracing::error!(operation, attempts = attempt, error = %e, "Giving up");
                    return Err(RetryError::Exhausted {
                        operation,
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts,
                        retry_in_secs = self.delay.as_secs(),
                        error = %e,
                        "Attempt failed, retrying",
                    );
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(RetryError::Cancelled { operation }),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
    }
}
