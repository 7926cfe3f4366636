//! Bounded exponential backoff for idempotent external reads.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{trace, warn};

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts including the first one; never less than 1.
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(attempts: usize) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Default::default()
        }
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let exp = self
            .initial_delay
            .saturating_mul(1u32 << (attempt.saturating_sub(1)).min(16) as u32);
        let capped = exp.min(self.max_delay);
        // 0.5x..1.5x jitter
        let jitter = rand::rng().random_range(0.5..1.5);
        Duration::from_secs_f64(capped.as_secs_f64() * jitter)
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are used up. The last error is returned.
pub async fn retry_transient<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    operation: &str,
    is_transient: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if !is_transient(&e) => {
                trace!(%operation, attempt, "non-retryable failure");
                return Err(e);
            }
            Err(e) if attempt >= policy.max_attempts => {
                warn!(%operation, attempt, "retries exhausted");
                return Err(e);
            }
            Err(_) => {
                let backoff = policy.delay_for(attempt);
                trace!(
                    %operation,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "retrying"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
