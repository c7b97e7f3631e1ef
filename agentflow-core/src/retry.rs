//! Retry with exponential backoff

use crate::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How often and how patiently a failed call is repeated
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryStrategy {
    pub max_retries: u32,
    pub backoff_factor: f64,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: 2.0,
        }
    }
}

impl RetryStrategy {
    pub fn new(max_retries: u32, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            backoff_factor,
        }
    }

    /// A single attempt, no retries
    pub fn none() -> Self {
        Self::new(0, 0.0)
    }

    /// Delay before retry number `attempt` (starting at 1)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let seconds = self.backoff_factor.max(0.0).powi(attempt as i32);
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }

    /// Run `call` until it succeeds or retries are exhausted
    ///
    /// Returns the value together with the number of attempts made. After the
    /// last failed attempt the error of that attempt is returned.
    pub async fn execute<T, F, Fut>(&self, mut call: F) -> (Result<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if attempt <= self.max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}

/// Invoke `call` with up to `max_retries` retries and `backoff_factor^attempt` second delays
pub async fn execute_with_retry<T, F, Fut>(
    call: F,
    max_retries: u32,
    backoff_factor: f64,
) -> Result<(T, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let (result, attempts) = RetryStrategy::new(max_retries, backoff_factor)
        .execute(call)
        .await;
    result.map(|value| (value, attempts))
}
