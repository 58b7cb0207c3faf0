//! Retry state machine for Slack API requests.
//!
//! Every request moves through `Pending -> Retrying(n) -> Succeeded | Failed`.
//! Rate limits wait for the interval Slack asked for; network and server
//! hiccups back off exponentially. Both paths are bounded.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{AppError, Result};

/// Blocking pause between attempts, abstracted so tests never sleep.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub max_rate_limit_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub default_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_rate_limit_retries: 10,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            default_rate_limit_wait: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the `retry`-th transient retry (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    fn rate_limit_wait(&self, retry_after_secs: Option<u64>) -> Duration {
        retry_after_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_rate_limit_wait)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Pending,
    Retrying(u32),
    Succeeded,
    Failed,
}

/// Runs fallible requests under a [`RetryPolicy`].
pub struct Retrier<'a> {
    policy: RetryPolicy,
    sleeper: &'a dyn Sleeper,
}

impl<'a> Retrier<'a> {
    pub fn new(policy: RetryPolicy, sleeper: &'a dyn Sleeper) -> Self {
        Self { policy, sleeper }
    }

    /// Pause used for pacing between pages.
    pub fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            self.sleeper.sleep(duration);
        }
    }

    /// Runs `request` until it succeeds, fails permanently, or the retry
    /// budget is spent. `operation` names the request in logs and errors.
    pub fn run<T, F>(&self, operation: &str, mut request: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut state = RetryState::Pending;
        let mut budget = Budget::default();
        let mut attempts = 0u32;
        debug!(operation, ?state, "request started");

        let result = loop {
            attempts += 1;
            match request() {
                Ok(value) => {
                    state = RetryState::Succeeded;
                    break Ok(value);
                }
                Err(err) => match self.next_wait(operation, &err, &mut budget) {
                    Some(wait) => {
                        self.sleeper.sleep(wait);
                        state = RetryState::Retrying(attempts);
                        debug!(operation, ?state, "retrying request");
                    }
                    None => {
                        state = RetryState::Failed;
                        break Err(exhausted(operation, attempts, err));
                    }
                },
            }
        };

        debug!(operation, attempts, ?state, "request finished");
        result
    }

    fn next_wait(&self, operation: &str, err: &AppError, budget: &mut Budget) -> Option<Duration> {
        match err {
            AppError::SlackRateLimit { retry_after_secs } => {
                if budget.rate_limited >= self.policy.max_rate_limit_retries {
                    return None;
                }
                budget.rate_limited += 1;
                let wait = self.policy.rate_limit_wait(*retry_after_secs);
                warn!(
                    operation,
                    wait_secs = wait.as_secs(),
                    "rate limited, sleeping before retrying"
                );
                Some(wait)
            }
            err if err.is_transient() => {
                if budget.transient >= self.policy.max_retries {
                    return None;
                }
                budget.transient += 1;
                let wait = self.policy.backoff(budget.transient);
                warn!(
                    operation,
                    retry = budget.transient,
                    max_retries = self.policy.max_retries,
                    "request failed ({err}), retrying in {wait:?}"
                );
                Some(wait)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Budget {
    transient: u32,
    rate_limited: u32,
}

/// Retryable errors that ran out of budget become `RetriesExhausted`; anything
/// else is permanent and returned as is.
fn exhausted(operation: &str, attempts: u32, err: AppError) -> AppError {
    if err.is_rate_limit() || err.is_transient() {
        AppError::RetriesExhausted {
            operation: operation.to_string(),
            attempts,
            last_error: err.to_string(),
        }
    } else {
        err
    }
}
