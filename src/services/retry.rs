//! Bounded timeout + retry wrapper for store I/O.

use crate::{
    config::AppConfig,
    errors::{ReconcileError, ReconcileResult},
};
use std::{future::Future, time::Duration};
use tracing::warn;

const BASE_BACKOFF_MS: u64 = 100;

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Upper bound on each individual attempt.
    pub timeout: Duration,
    /// Retries after the first attempt; only transient failures are retried.
    pub max_retries: u32,
    /// First backoff delay; doubles after each failed attempt.
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            timeout: cfg.io_timeout,
            max_retries: cfg.max_retries,
            base_backoff: Duration::from_millis(BASE_BACKOFF_MS),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Run `call` until it succeeds, fails permanently, or exhausts the policy.
///
/// Each attempt is bounded by `policy.timeout`. A timed-out attempt counts
/// as transient.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, op: &str, mut call: F) -> ReconcileResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ReconcileResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let err = match tokio::time::timeout(policy.timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
            Err(_) => ReconcileError::Timeout {
                op: op.to_string(),
                after: policy.timeout,
            },
        };

        if !err.is_transient() {
            return Err(err);
        }
        if attempt > policy.max_retries {
            return Err(ReconcileError::RetriesExhausted {
                op: op.to_string(),
                attempts: attempt,
                source: Box::new(err),
            });
        }

        let delay = policy.backoff(attempt);
        warn!(
            "{} failed (attempt {}/{}): {}, retrying in {}ms",
            op,
            attempt,
            policy.max_retries + 1,
            err,
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
    }
}
