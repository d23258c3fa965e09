//! Retry policy with exponential backoff.

use std::future::Future;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::{ExtractError, Result};

/// Retry policy for network fetches.
///
/// The budget applies per operation (one font face, one segment), not per
/// extraction. Cancellation is observed between attempts; an attempt in
/// flight runs to its own timeout.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retries after the first attempt
    pub max_retries: u32,

    /// Backoff before the first retry
    pub initial_backoff: Duration,

    /// Backoff multiplier between retries
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Run `operation` until it succeeds, a non-retryable error occurs, the
    /// budget runs out, or the token is cancelled.
    pub async fn execute<F, Fut, T>(&self, cancel: &CancelToken, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;

        loop {
            if cancel.is_cancelled() {
                return Err(ExtractError::Cancelled);
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.should_retry() || attempt >= self.max_retries => {
                    return Err(err);
                }
                Err(err) => {
                    attempt += 1;
                    tracing::warn!(attempt, %err, "attempt failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = Duration::from_secs_f64(backoff.as_secs_f64() * self.multiplier);
                }
            }
        }
    }
}
