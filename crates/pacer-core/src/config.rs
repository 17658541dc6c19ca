//! Config - キュー設定
//!
//! 既定値は生成 AI の無料枠向け: 同時実行 1、ディスパッチ間隔 2 秒。
//!
//! # 環境変数
//!
//! - `PACER_CONCURRENCY`
//! - `PACER_MIN_INTERVAL_MS`
//! - `PACER_POLL_INTERVAL_MS`
//! - `PACER_RETRY_BOOST`
//! - `PACER_DAILY_LIMIT`
//! - `PACER_PER_MINUTE_LIMIT`
//! - `PACER_EVENT_CAPACITY`
//!
//! どの値もランタイムのセッターと同じ範囲に丸められる。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 5;
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(500);
pub const MIN_DAILY_LIMIT: u32 = 100;
pub const MIN_PER_MINUTE_LIMIT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Operations executing at once, within [1, 5].
    pub concurrency_limit: usize,

    /// Spacing between consecutive dispatches, at least 500 ms.
    #[serde(with = "millis")]
    pub min_request_interval: Duration,

    /// Upper bound on how long the dispatcher idles between checks.
    #[serde(with = "millis")]
    pub poll_interval: Duration,

    /// Priority added to a request each time it is retried.
    pub retry_priority_boost: i32,

    /// Successful requests allowed per UTC day, at least 100. `None` disables
    /// the budget.
    pub daily_limit: Option<u32>,

    /// Dispatches allowed per 60 second window, at least 1. Requests over
    /// the cap wait for the next window. `None` disables the cap.
    pub per_minute_limit: Option<u32>,

    /// Buffered events per subscriber before it starts lagging.
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 1,
            min_request_interval: Duration::from_millis(2_000),
            poll_interval: Duration::from_millis(100),
            retry_priority_boost: 10,
            daily_limit: None,
            per_minute_limit: None,
            event_capacity: 256,
        }
    }
}

impl QueueConfig {
    /// Apply the clamps the runtime setters apply.
    pub fn normalized(mut self) -> Self {
        self.concurrency_limit = clamp_concurrency(self.concurrency_limit);
        self.min_request_interval = clamp_interval(self.min_request_interval);
        self.daily_limit = self.daily_limit.map(clamp_daily_limit);
        self.per_minute_limit = self.per_minute_limit.map(clamp_per_minute_limit);
        self
    }

    /// Defaults overridden by `PACER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(n) = read_number(&lookup, "PACER_CONCURRENCY")? {
            config.concurrency_limit = n as usize;
        }
        if let Some(ms) = read_number(&lookup, "PACER_MIN_INTERVAL_MS")? {
            config.min_request_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = read_number(&lookup, "PACER_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(boost) = read_number(&lookup, "PACER_RETRY_BOOST")? {
            config.retry_priority_boost = boost.min(i32::MAX as u64) as i32;
        }
        if let Some(limit) = read_number(&lookup, "PACER_DAILY_LIMIT")? {
            config.daily_limit = Some(limit.min(u32::MAX as u64) as u32);
        }
        if let Some(limit) = read_number(&lookup, "PACER_PER_MINUTE_LIMIT")? {
            config.per_minute_limit = Some(limit.min(u32::MAX as u64) as u32);
        }
        if let Some(capacity) = read_number(&lookup, "PACER_EVENT_CAPACITY")? {
            config.event_capacity = capacity as usize;
        }

        Ok(config.normalized())
    }
}

pub fn clamp_concurrency(n: usize) -> usize {
    n.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
}

pub fn clamp_interval(interval: Duration) -> Duration {
    interval.max(MIN_REQUEST_INTERVAL)
}

pub fn clamp_daily_limit(limit: u32) -> u32 {
    limit.max(MIN_DAILY_LIMIT)
}

pub fn clamp_per_minute_limit(limit: u32) -> u32 {
    limit.max(MIN_PER_MINUTE_LIMIT)
}

fn read_number<F>(lookup: &F, var: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value: raw }),
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
