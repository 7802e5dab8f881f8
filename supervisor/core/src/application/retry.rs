// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Bounded retry with a fixed delay between attempts.
//!
//! Iterative on purpose: the last error is carried through the loop and
//! returned once the budget is spent. The delay is not cancellable; callers
//! that lose interest let the attempt run out.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// A budget of zero still runs the operation once so there is an error
    /// to propagate.
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Invoke `operation` until it succeeds or the attempt budget is spent.
///
/// The closure receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_if(policy, |_| true, operation).await
}

/// Like [`retry`], but an error rejected by `is_retryable` is returned at
/// once without spending the rest of the budget.
pub async fn retry_if<T, E, F, Fut, P>(
    policy: RetryPolicy,
    mut is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.effective_attempts();
    let mut attempt = 1;

    loop {
        let err = match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, max_attempts, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) {
            debug!(attempt, error = %err, "Error is not retryable");
            return Err(err);
        }

        if attempt >= max_attempts {
            warn!(attempt, max_attempts, error = %err, "Retry budget exhausted");
            return Err(err);
        }

        warn!(
            attempt,
            max_attempts,
            delay_ms = policy.delay.as_millis() as u64,
            error = %err,
            "Attempt failed, retrying"
        );
        tokio::time::sleep(policy.delay).await;
        attempt += 1;
    }
}
