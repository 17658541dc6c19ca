//! QueueBuilder - キューの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターン
//! - 起動時検証 (`build()` で失敗させ、最初の投入まで持ち越さない)

use std::sync::Arc;

use crate::config::QueueConfig;
use crate::domain::{Decider, DefaultDecider};
use crate::error::BuildError;
use crate::impls::{BroadcastEventSink, TracingEventSink};
use crate::ports::{Clock, EventSink, IdGenerator, SystemClock, UlidGenerator};
use crate::queue::RequestQueue;

/// Wires a [`RequestQueue`] from its configuration and ports.
///
/// # 使用例
/// ```ignore
/// let queue = QueueBuilder::new()
///     .config(QueueConfig::from_env()?)
///     .sink(Arc::new(MetricsSink::default()))
///     .build()?;
/// ```
///
/// Unset ports default to the system clock, ULID ids, [`DefaultDecider`] and a
/// [`TracingEventSink`].
pub struct QueueBuilder {
    config: QueueConfig,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    decider: Option<Arc<dyn Decider>>,
    sinks: Vec<Arc<dyn EventSink>>,
    log_events: bool,
}

impl QueueBuilder {
    pub fn new() -> Self {
        Self {
            config: QueueConfig::default(),
            clock: None,
            ids: None,
            decider: None,
            sinks: Vec::new(),
            log_events: true,
        }
    }

    /// Replace the whole configuration. Out-of-range values are clamped.
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.config.concurrency_limit = limit;
        self
    }

    pub fn min_request_interval(mut self, interval: std::time::Duration) -> Self {
        self.config.min_request_interval = interval;
        self
    }

    pub fn daily_limit(mut self, limit: u32) -> Self {
        self.config.daily_limit = Some(limit);
        self
    }

    pub fn per_minute_limit(mut self, limit: u32) -> Self {
        self.config.per_minute_limit = Some(limit);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    /// Attach an extra event sink. Sinks run synchronously on the queue's
    /// tasks and must not block.
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Turn off the built-in [`TracingEventSink`].
    pub fn without_event_logging(mut self) -> Self {
        self.log_events = false;
        self
    }

    pub fn build(self) -> Result<RequestQueue, BuildError> {
        if self.config.event_capacity == 0 {
            return Err(BuildError::ZeroEventCapacity);
        }
        if self.config.poll_interval.is_zero() {
            return Err(BuildError::ZeroPollInterval);
        }

        let config = self.config.normalized();
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let decider = self.decider.unwrap_or_else(|| Arc::new(DefaultDecider));

        let mut sinks = self.sinks;
        if self.log_events {
            sinks.insert(0, Arc::new(TracingEventSink));
        }

        Ok(RequestQueue::from_parts(
            &config,
            decider,
            clock,
            ids,
            BroadcastEventSink::new(config.event_capacity),
            sinks,
        ))
    }
}

impl Default for QueueBuilder {
    fn default() -> Self {
        Self::new()
    }
}
