//! Retry policy: decides backoff delays.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Fraction of the exponential delay added or removed as jitter.
pub const JITTER_RATIO: f64 = 0.3;

/// Backoff parameters for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Ceiling applied before jitter.
    pub max_delay: Duration,

    /// Growth factor per retry.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Exponential delay for the given retry number, without jitter.
    ///
    /// `retry` is 1 for the first retry:
    /// `min(max_delay, base_delay * multiplier^(retry - 1))`.
    ///
    /// With the defaults (1s, 30s, 2.0): 1s, 2s, 4s, 8s, 16s, 30s, 30s...
    pub fn exponential_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let delay_ms = (base_ms * self.multiplier.powi(exponent)).min(max_ms);
        if delay_ms.is_finite() && delay_ms > 0.0 {
            Duration::from_millis(delay_ms.round() as u64)
        } else {
            Duration::ZERO
        }
    }

    /// Exponential delay with `factor` applied as jitter, floored to whole
    /// milliseconds. `factor` is clamped to `[-JITTER_RATIO, JITTER_RATIO]`.
    pub fn delay_with_jitter(&self, retry: u32, factor: f64) -> Duration {
        let factor = factor.clamp(-JITTER_RATIO, JITTER_RATIO);
        let delay_ms = self.exponential_delay(retry).as_millis() as f64;
        let jittered = (delay_ms * (1.0 + factor)).floor();
        if jittered.is_finite() && jittered > 0.0 {
            Duration::from_millis(jittered as u64)
        } else {
            Duration::ZERO
        }
    }

    /// Delay for the next retry with uniformly random jitter.
    pub fn next_delay(&self, retry: u32) -> Duration {
        let factor = rand::thread_rng().gen_range(-JITTER_RATIO..=JITTER_RATIO);
        self.delay_with_jitter(retry, factor)
    }
}
