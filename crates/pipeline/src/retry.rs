//! Bounded retry wrapper for tasks.

use crate::task::{Payload, Task, TaskError};
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

/// Retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled per attempt up to `max_delay`.
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to each delay (ms).
    pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            max_jitter_ms: 250,
        }
    }
}

impl RetryConfig {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_jitter_ms: 0,
        }
    }

    /// Delay before attempt `attempt` (0-indexed; attempt 0 never waits).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        let base = std::cmp::min(self.initial_delay.saturating_mul(factor), self.max_delay);
        if self.max_jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..self.max_jitter_ms))
    }
}

/// Wraps a task and re-runs it while `is_retryable` accepts the error.
pub struct Retrying<T> {
    inner: T,
    config: RetryConfig,
    is_retryable: fn(&TaskError) -> bool,
}

impl<T> Retrying<T> {
    pub fn new(inner: T, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            is_retryable: TaskError::is_transient,
        }
    }

    /// Replace the transience predicate.
    pub fn with_predicate(mut self, is_retryable: fn(&TaskError) -> bool) -> Self {
        self.is_retryable = is_retryable;
        self
    }
}

#[async_trait]
impl<P, T> Task<P> for Retrying<T>
where
    P: Payload,
    T: Task<P>,
{
    fn id(&self) -> P::TaskId {
        self.inner.id()
    }

    async fn run(&self, payload: &P) -> Result<Vec<P::Update>, TaskError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let delay = self.config.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match self.inner.run(payload).await {
                Ok(updates) => {
                    if attempt > 0 {
                        tracing::info!(task = %self.inner.id(), attempts = attempt + 1, "task succeeded after retry");
                    }
                    return Ok(updates);
                }
                Err(e) if (self.is_retryable)(&e) && attempt + 1 < max_attempts => {
                    tracing::warn!(
                        task = %self.inner.id(),
                        height = payload.height(),
                        attempt = attempt + 1,
                        max_attempts,
                        reason = %e,
                        "task failed, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
