// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry loops with backoff, jitter, and cancellation.

use crate::error::ApiError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
enum Backoff {
    Constant(Duration),
    /// Doubles from `base` up to `cap`, with full jitter.
    Exponential { base: Duration, cap: Duration },
}

/// Drives an operation until success, a terminal error, or exhaustion.
///
/// `Locked` errors sleep for the server-supplied `Retry-After` instead of
/// the configured backoff, so the claim protocol follows the server's
/// pacing exactly.
#[derive(Debug, Clone, Copy)]
pub struct Retrier {
    max_attempts: Option<u32>,
    backoff: Backoff,
}

impl Retrier {
    /// Fixed delay, bounded attempts. No jitter: tests and the disconnect
    /// path rely on exact sleeps.
    pub fn constant(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts: Some(max_attempts), backoff: Backoff::Constant(delay) }
    }

    /// Fixed delay, unbounded. Used where giving up loses data (finish,
    /// chunk upload); callers gate these with an outer timeout context.
    pub fn forever(delay: Duration) -> Self {
        Self { max_attempts: None, backoff: Backoff::Constant(delay) }
    }

    /// Exponential backoff with full jitter, bounded attempts.
    pub fn exponential(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self { max_attempts: Some(max_attempts), backoff: Backoff::Exponential { base, cap } }
    }

    fn delay_for(&self, err: &ApiError, attempt: u32) -> Duration {
        if let ApiError::Locked { retry_after } = err {
            return *retry_after;
        }
        match self.backoff {
            Backoff::Constant(d) => d,
            Backoff::Exponential { base, cap } => {
                let exp = base.saturating_mul(1u32 << attempt.min(16).saturating_sub(1));
                let capped = exp.min(cap);
                // Full jitter: uniform in [0, capped]
                let ms = rand::thread_rng().gen_range(0..=capped.as_millis().max(1) as u64);
                Duration::from_millis(ms)
            }
        }
    }

    /// Run `f` until it succeeds or retries are exhausted.
    ///
    /// `f` receives the 1-based attempt number. Non-retryable errors
    /// and cancellation short-circuit.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        action: &'static str,
        mut f: F,
    ) -> Result<T, ApiError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match f(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.retryable() {
                return Err(err);
            }
            if let Some(max) = self.max_attempts {
                if attempt >= max {
                    return Err(err);
                }
                tracing::warn!(action, error = %err, "Attempt {}/{} failed, retrying", attempt, max);
            } else {
                tracing::warn!(action, error = %err, "Attempt {} failed, retrying", attempt);
            }

            let delay = self.delay_for(&err, attempt);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(ApiError::Canceled { action }),
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
