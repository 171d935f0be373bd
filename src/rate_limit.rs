use crate::config::RateLimitConfig;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Randomized pause in front of an async operation.
///
/// Every call to [`RateLimiter::limited`] sleeps for a duration drawn
/// uniformly from `[min_delay, max_delay]` before running the operation,
/// whatever happened on previous calls.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    min_delay: Duration,
    max_delay: Duration,
}

impl RateLimiter {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay: min_delay.min(max_delay),
            max_delay,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.min_delay(), config.max_delay())
    }

    pub fn next_delay(&self) -> Duration {
        if self.min_delay >= self.max_delay {
            return self.min_delay;
        }
        rand::thread_rng().gen_range(self.min_delay..=self.max_delay)
    }

    pub async fn limited<F, Fut, T>(&self, operation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let delay = self.next_delay();
        if !delay.is_zero() {
            debug!("[RATE LIMIT] Sleeping {:?} before request", delay);
            tokio::time::sleep(delay).await;
        }
        operation().await
    }
}
