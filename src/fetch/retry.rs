use std::future::Future;
use std::time::Duration;

use log::warn;
use tokio::time::sleep;

use crate::config::RetryConfig;
use crate::error::FetchError;

/// Exponential backoff: the delay after failed attempt `n` is `base * 2^(n-1)`, optionally capped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Option<Duration>,
}

/// Why a retried operation gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// A non-retryable failure; returned on the attempt it happened.
    Terminal(FetchError),
    /// Every attempt failed with a retryable error.
    Exhausted { attempts: u32, last: FetchError },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(1_000))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: None,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay).with_max_delay(config.max_delay)
    }

    pub fn with_max_delay(mut self, max_delay: Option<Duration>) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after 1-based attempt `attempt` failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay.saturating_mul(factor);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Run `operation` until it succeeds, fails terminally, or the attempts run out.
    /// The closure receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(RetryError::Terminal(err)),
                Err(err) if attempt >= self.max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: err,
                    })
                }
                Err(err) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "{label}: attempt {attempt}/{} failed ({err}); retrying in {}ms",
                        self.max_attempts,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
