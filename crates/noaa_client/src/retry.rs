//! Bounded retry with a fixed delay.

use std::future::Future;
use std::time::Duration;

use common::config::RetryConfig;
use tracing::warn;

use crate::FetchError;

/// Outcome of one candidate after the policy has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    /// Bytes written.
    Fetched(u64),
    /// Permanent miss; no retry budget was spent on it.
    NotFound,
    /// Every attempt failed transiently; carries the last error.
    Exhausted(String),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self::new(cfg.max_attempts, Duration::from_secs_f64(cfg.delay_secs.max(0.0)))
    }

    /// Run `op` until it succeeds, reports not-found, or the attempts run out.
    pub async fn run<F, Fut>(&self, label: &str, mut op: F) -> Acquisition
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<u64, FetchError>>,
    {
        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            match op().await {
                Ok(bytes) => return Acquisition::Fetched(bytes),
                Err(FetchError::NotFound(_)) => return Acquisition::NotFound,
                Err(FetchError::Transient(e)) => {
                    warn!(
                        "{} attempt {}/{} failed: {}",
                        label, attempt, self.max_attempts, e
                    );
                    last_error = e;
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }
        Acquisition::Exhausted(last_error)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
