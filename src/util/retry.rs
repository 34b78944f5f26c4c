//! Retry with exponential backoff and jitter for the REST endpoints.
//!
//! The speech protocol layer never retries; only the chat and image glue use
//! this policy.

use std::future::Future;
use std::time::Duration;

use crate::error::VolcError;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that runs the operation exactly once.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Execute an async operation, retrying errors that report themselves
    /// as retryable.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, VolcError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, VolcError>>,
    {
        if self.max_attempts == 0 {
            return Err(VolcError::InvalidState(
                "Retry policy configured with zero attempts".into(),
            ));
        }

        let mut backoff = self.initial_backoff;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !err.is_retryable() || attempt >= self.max_attempts {
                return Err(err);
            }

            let delay = self.delay_for(&err, backoff);
            tracing::warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying volcengine request"
            );
            tokio::time::sleep(delay).await;

            backoff = Duration::from_secs_f64(
                (backoff.as_secs_f64() * self.multiplier).min(self.max_backoff.as_secs_f64()),
            );
        }
    }

    /// Server hints win over the computed backoff, capped at `max_backoff`.
    fn delay_for(&self, err: &VolcError, backoff: Duration) -> Duration {
        if let VolcError::RateLimited {
            retry_after_ms: Some(ms),
        } = err
        {
            return Duration::from_millis(*ms).min(self.max_backoff);
        }
        // 75%..125% of the nominal backoff
        let jitter = 0.75 + rand_factor() * 0.5;
        Duration::from_secs_f64(backoff.as_secs_f64() * jitter)
    }
}

/// Pseudo-random factor in [0, 1) for jitter.
fn rand_factor() -> f64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    std::thread::current().id().hash(&mut hasher);

    (hasher.finish() % 10_000) as f64 / 10_000.0
}
