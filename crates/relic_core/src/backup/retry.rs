//! Bounded retry with a fixed delay schedule.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// How many times to attempt an operation and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before attempt `n + 2` is `delays[n]`; the last entry repeats.
    pub delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    /// Three attempts, waiting 2s then 4s.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delays: vec![Duration::from_secs(2), Duration::from_secs(4)],
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delays: Vec::new(),
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based), or
    /// `None` when no attempts remain.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts.max(1) {
            return None;
        }
        let index = usize::try_from(attempt.saturating_sub(1)).unwrap_or(usize::MAX);
        Some(
            self.delays
                .get(index)
                .or_else(|| self.delays.last())
                .copied()
                .unwrap_or(Duration::ZERO),
        )
    }

    /// Run `operation` until it succeeds or attempts run out.
    ///
    /// # Returns
    /// The first success, or the number of attempts made and the last error.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, (u32, E)>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    tracing::warn!("{} attempt {} failed: {}", label, attempt, err);
                    match self.delay_after(attempt) {
                        Some(delay) => {
                            tracing::debug!("Retrying {} in {:?}", label, delay);
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        None => return Err((attempt, err)),
                    }
                }
            }
        }
    }
}
