//! Bounded retry with exponential backoff.
//!
//! ```text
//! attempt 1 ─ Transient ─ sleep 60s ─ attempt 2 ─ Transient ─ sleep 120s ─ ...
//!     │                                   │
//!     ├─ Ok(value)   → Completed          ├─ Permanent → Rejected (no sleep)
//!     └─ Permanent   → Rejected           └─ ... attempt 8 Transient → Exhausted
//! ```
//!
//! The cancellation token is checked before every request and before every
//! sleep; a cancelled sequence stops with `RetryOutcome::Cancelled`.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::errors::IssueError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(7200);

/// Attempt budget and backoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each later attempt.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay slept before 1-based `attempt`: `min(base * 2^(attempt-2), max)`.
    ///
    /// The first attempt runs immediately.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt < 2 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Every delay of a fully exhausted sequence, in order.
    pub fn delays(&self) -> Vec<Duration> {
        (2..=self.max_attempts)
            .map(|attempt| self.delay_before(attempt))
            .collect()
    }
}

/// Result of a single attempt, tagged for the retry driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Ok(T),
    Transient(String),
    Permanent(String),
}

impl<T> From<Result<T, IssueError>> for Attempt<T> {
    fn from(result: Result<T, IssueError>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(e) if e.is_retriable() => Self::Transient(e.to_string()),
            Err(e) => Self::Permanent(e.to_string()),
        }
    }
}

/// How a retry sequence ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Completed { value: T, attempts: u32 },
    /// A permanent failure stopped the sequence.
    Rejected { reason: String, attempts: u32 },
    /// Every attempt failed transiently.
    Exhausted { reason: String, attempts: u32 },
    Cancelled { attempts: u32 },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Completed { attempts, .. }
            | Self::Rejected { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Completed { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Waits between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Sleep for `delay`. Returns `false` if `cancel` fired first.
    async fn sleep(&self, delay: Duration, cancel: &CancellationToken) -> bool;
}

/// Real sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// Drive `op` until it succeeds, fails permanently, runs out of attempts,
/// or `cancel` fires. `op` receives the 1-based attempt number.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    cancel: &CancellationToken,
    label: &str,
    mut op: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return RetryOutcome::Cancelled {
                attempts: attempt - 1,
            };
        }

        let reason = match op(attempt).await {
            Attempt::Ok(value) => {
                return RetryOutcome::Completed {
                    value,
                    attempts: attempt,
                }
            }
            Attempt::Permanent(reason) => {
                return RetryOutcome::Rejected {
                    reason,
                    attempts: attempt,
                }
            }
            Attempt::Transient(reason) => reason,
        };

        if attempt >= max_attempts {
            return RetryOutcome::Exhausted {
                reason,
                attempts: attempt,
            };
        }

        let delay = policy.delay_before(attempt + 1);
        warn!(
            attempt,
            max_attempts,
            delay_secs = delay.as_secs(),
            error = %reason,
            "{label} attempt failed, retrying"
        );
        if cancel.is_cancelled() || !sleeper.sleep(delay, cancel).await {
            return RetryOutcome::Cancelled { attempts: attempt };
        }
        attempt += 1;
    }
}
