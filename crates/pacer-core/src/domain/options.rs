//! SubmitOptions - 投入ごとのオプション

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::queue::RetryPolicy;

/// Options recognised by `RequestQueue::submit`.
///
/// The backoff fields default to 1s / 30s / 2.0. `timeout` bounds each attempt
/// separately; when it elapses the attempt counts as a transient failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitOptions {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,

    pub base_delay: Duration,

    pub max_delay: Duration,

    pub backoff_multiplier: f64,

    /// Higher is serviced first.
    pub priority: i32,

    /// Per-attempt timeout. `None` lets an attempt run as long as it needs.
    pub timeout: Option<Duration>,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: 3,
            base_delay: policy.base_delay,
            max_delay: policy.max_delay,
            backoff_multiplier: policy.multiplier,
            priority: 0,
            timeout: None,
        }
    }
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            multiplier: self.backoff_multiplier,
        }
    }
}
