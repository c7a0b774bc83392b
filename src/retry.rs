//! Bounded retry for browser work.
//!
//! One policy type shared by every caller that needs "try again a few times,
//! waiting a bit longer each time". The schedule is a plain iterator of
//! delays fed to `tokio_retry`, which also takes care of the sleeping.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_retry::RetryIf;

use crate::config::NavigatorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// `base * attempt`
    Linear,
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            backoff: Backoff::Linear,
        }
    }
}

impl From<&NavigatorConfig> for RetryPolicy {
    fn from(config: &NavigatorConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_delay_ms),
            backoff: Backoff::Linear,
        }
    }
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: Backoff::Linear,
        }
    }

    /// Policy that gives up after the first failure.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            backoff: Backoff::Fixed,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Linear => self.base_delay.saturating_mul(retry),
        }
    }

    /// The full sleep schedule, one entry per retry after the first attempt.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..self.max_attempts).map(move |retry| self.delay_for(retry))
    }

    /// Runs `action` until it succeeds, `is_retryable` rejects the error, or
    /// the attempts are used up. The last error is returned.
    pub async fn run<T, E, F, Fut, P>(&self, mut action: F, mut is_retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(&E) -> bool,
    {
        let schedule: Vec<Duration> = self.delays().collect();
        RetryIf::spawn(schedule, || action(), |error: &E| is_retryable(error)).await
    }
}
