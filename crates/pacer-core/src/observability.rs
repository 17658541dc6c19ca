//! Observability - 状態スナップショットと累積カウンタ
//!
//! `QueueStatus` はある時点のキューの様子、`QueueCounts` は構築以降の累計。
//! どちらも serde でそのまま JSON に出せる。

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cumulative counters since the queue was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub cleared: u64,
    /// Rejected by the daily budget or shutdown.
    pub rejected: u64,
}

/// Point-in-time view of the queue, as returned by `queue_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub queue_length: usize,
    pub active_requests: usize,
    /// Requests waiting out a backoff delay.
    pub retry_scheduled: usize,
    pub is_processing: bool,
    pub concurrency_limit: usize,
    pub min_request_interval_ms: u64,
    pub requests_today: u32,
    pub daily_limit: Option<u32>,
    /// Dispatches in the current 60 second window.
    pub requests_this_minute: u32,
    pub per_minute_limit: Option<u32>,
    pub accepting: bool,
    pub counts: QueueCounts,
}

impl QueueStatus {
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    /// No pending, scheduled or in-flight work.
    pub fn is_idle(&self) -> bool {
        self.queue_length == 0 && self.active_requests == 0 && self.retry_scheduled == 0
    }
}
