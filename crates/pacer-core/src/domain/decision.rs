//! Decision model: what to do after a failed attempt.

use std::time::Duration;

use super::OperationError;
use crate::queue::RetryPolicy;

/// Next action for a request whose attempt failed.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Re-queue after `delay`.
    Retry { delay: Duration, reason: String },

    /// Give up and reject the caller.
    Fail { reason: String },
}

impl Decision {
    pub fn is_retry(&self) -> bool {
        matches!(self, Decision::Retry { .. })
    }
}

/// Retry bookkeeping a decider looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryState {
    pub retry_count: u32,
    pub max_retries: u32,
    pub policy: RetryPolicy,
}

/// Decides the next action from the retry state and the last error.
///
/// Deciders are pure: they never touch the queue. Applying the decision is the
/// dispatcher's job.
pub trait Decider: Send + Sync {
    fn decide(&self, state: &RetryState, error: &OperationError) -> Decision;
}

/// Retries retryable kinds until `max_retries` is spent, with jittered
/// exponential backoff.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDecider;

impl Decider for DefaultDecider {
    fn decide(&self, state: &RetryState, error: &OperationError) -> Decision {
        if !error.is_retryable() {
            return Decision::Fail {
                reason: format!("non-retryable {} error", error.kind()),
            };
        }
        if state.retry_count >= state.max_retries {
            return Decision::Fail {
                reason: format!("retry budget exhausted ({}/{})", state.retry_count, state.max_retries),
            };
        }

        let retry = state.retry_count + 1;
        let delay = state.policy.next_delay(retry);
        Decision::Retry {
            delay,
            reason: format!("retry {}/{} after {:?}", retry, state.max_retries, delay),
        }
    }
}
