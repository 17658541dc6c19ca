//! RequestQueue - 優先度・ペース配分・バックオフ付きリトライ
//!
//! `RequestQueue` は clone しても同じキューを指すハンドル。投入された
//! リクエストは優先度キューに入り、単一のディスパッチャタスクが取り出す。
//!
//! # 制約
//! - 同時実行は `concurrency_limit` 件まで
//! - 連続するディスパッチの間隔は `min_request_interval` 以上
//! - 日次枠と分単位枠 (どちらも任意)
//!
//! 失敗した試行は `Decider` に渡され、バックオフ後のリトライか失敗かが決まる。

mod budget;
mod dispatcher;
mod operation;
mod pending;
mod record;
mod retry;
mod state;

#[cfg(test)]
mod tests;

pub use retry::{JITTER_RATIO, RetryPolicy};
pub use state::RequestState;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, broadcast, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info};

use self::dispatcher::{QueueState, Shared};
use self::operation::{Reply, TypedOperation};
use self::record::QueueItem;
use crate::config::{QueueConfig, clamp_concurrency, clamp_interval};
use crate::domain::{BatchId, Decider, OperationError, QueueEvent, RequestId, SubmitOptions};
use crate::error::QueueError;
use crate::impls::BroadcastEventSink;
use crate::observability::{QueueCounts, QueueStatus};
use crate::ports::{Clock, EventSink, IdGenerator};

/// Handle to a request queue. Clones share the same queue.
///
/// Build one with [`crate::app::QueueBuilder`]. Submissions must happen inside
/// a Tokio runtime; the dispatcher is spawned on first use.
#[derive(Clone)]
pub struct RequestQueue {
    shared: Arc<Shared>,
}

impl RequestQueue {
    pub(crate) fn from_parts(
        config: &QueueConfig,
        decider: Arc<dyn Decider>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        broadcast: BroadcastEventSink,
        sinks: Vec<Arc<dyn EventSink>>,
    ) -> Self {
        let state = QueueState::new(config, &*clock);
        let (running, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                wake: Notify::new(),
                running,
                decider,
                clock,
                ids,
                broadcast,
                sinks,
            }),
        }
    }

    /// Queue `operation` and return a ticket that settles with its outcome.
    ///
    /// The operation is a factory: each attempt calls it again.
    pub fn enqueue<T, F, Fut>(&self, operation: F, options: SubmitOptions) -> Ticket<T>
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, OperationError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let id = self.shared.ids.generate_request_id();
        let mut item = QueueItem::new(
            id,
            Box::new(TypedOperation::new(operation, tx)),
            &options,
            self.shared.clock.now(),
        );

        let (size, start) = {
            let mut state = self.shared.state.lock();
            if !state.accepting {
                item.reject(QueueError::ShutdownInProgress);
                state.counts.rejected += 1;
                return Ticket { id, rx };
            }
            state.pending.push(item);
            state.counts.submitted += 1;
            let start = !state.running;
            if start {
                state.set_running(true, &self.shared.running);
            }
            (state.pending.len(), start)
        };

        debug!(%id, priority = options.priority, max_retries = options.max_retries, size, "request queued");
        self.shared.emit_all(&[QueueEvent::QueueUpdated { size }]);

        if start {
            tokio::spawn(dispatcher::run(Arc::clone(&self.shared)));
        } else {
            self.shared.wake.notify_one();
        }

        Ticket { id, rx }
    }

    /// Queue `operation` and wait for its outcome.
    pub async fn submit<T, F, Fut>(&self, operation: F, options: SubmitOptions) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, OperationError>> + Send + 'static,
    {
        self.enqueue(operation, options).await
    }

    pub fn queue_status(&self) -> QueueStatus {
        let today = self.shared.clock.now().date_naive();
        let now = Instant::now();
        let mut state = self.shared.state.lock();
        QueueStatus {
            queue_length: state.pending.len(),
            active_requests: state.active,
            retry_scheduled: state.retries.len(),
            is_processing: state.running,
            concurrency_limit: state.concurrency_limit,
            min_request_interval_ms: state.min_request_interval.as_millis() as u64,
            requests_today: state.daily.used(today),
            daily_limit: state.daily.limit(),
            requests_this_minute: state.minute.count(now),
            per_minute_limit: state.minute.limit(),
            accepting: state.accepting,
            counts: state.counts,
        }
    }

    pub fn counts(&self) -> QueueCounts {
        self.shared.state.lock().counts
    }

    /// Reject every pending request with [`QueueError::Cleared`].
    ///
    /// Requests in flight or waiting out a backoff delay are left alone.
    /// Returns the number of requests cleared.
    pub fn clear_queue(&self) -> usize {
        let count = {
            let mut state = self.shared.state.lock();
            let mut count = 0;
            for mut item in state.pending.drain() {
                item.mark_cleared();
                count += 1;
            }
            state.counts.cleared += count as u64;
            count
        };

        info!(count, "queue cleared");
        self.shared.emit_all(&[
            QueueEvent::QueueCleared { count },
            QueueEvent::QueueUpdated { size: 0 },
        ]);
        count
    }

    /// Clamped to [1, 5]. Returns the limit applied.
    pub fn set_concurrent_limit(&self, limit: usize) -> usize {
        let limit = clamp_concurrency(limit);
        self.shared.state.lock().concurrency_limit = limit;
        info!(limit, "concurrency limit updated");
        self.shared.wake.notify_one();
        limit
    }

    /// At least 500 ms. Returns the interval applied.
    pub fn set_min_request_interval(&self, interval: Duration) -> Duration {
        let interval = clamp_interval(interval);
        self.shared.state.lock().min_request_interval = interval;
        info!(interval_ms = interval.as_millis() as u64, "minimum request interval updated");
        self.shared.wake.notify_one();
        interval
    }

    /// At least 100. Returns the limit applied.
    pub fn set_daily_limit(&self, limit: u32) -> u32 {
        let limit = self.shared.state.lock().daily.set_limit(limit);
        info!(limit, "daily request limit updated");
        self.shared.wake.notify_one();
        limit
    }

    /// At least 1. Returns the limit applied.
    pub fn set_per_minute_limit(&self, limit: u32) -> u32 {
        let limit = self.shared.state.lock().minute.set_limit(limit);
        info!(limit, "per-minute request limit updated");
        self.shared.wake.notify_one();
        limit
    }

    pub fn reset_daily_count(&self) {
        self.shared.state.lock().daily.reset();
        info!("daily request count reset");
        self.shared.wake.notify_one();
    }

    pub(crate) fn generate_batch_id(&self) -> BatchId {
        self.shared.ids.generate_batch_id()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.shared.broadcast.subscribe()
    }

    /// Stop accepting requests, reject everything not yet in flight with
    /// [`QueueError::ShutdownInProgress`], and wait for in-flight attempts.
    ///
    /// Attempts that fail during shutdown are not retried.
    pub async fn shutdown(&self) {
        let mut events = Vec::new();
        {
            let mut state = self.shared.state.lock();
            state.accepting = false;
            let mut rejected: Vec<QueueItem> = state.pending.drain().collect();
            rejected.extend(state.retries.drain());
            for item in &mut rejected {
                item.reject(QueueError::ShutdownInProgress);
                events.push(QueueEvent::OperationFailed {
                    id: item.id,
                    error: QueueError::ShutdownInProgress.to_string(),
                });
            }
            state.counts.rejected += rejected.len() as u64;
            info!(rejected = rejected.len(), active = state.active, "shutting down");
        }
        events.push(QueueEvent::QueueUpdated { size: 0 });
        self.shared.emit_all(&events);
        self.shared.wake.notify_one();

        let mut running = self.shared.running.subscribe();
        // the sender lives in `shared`, so this only returns once idle
        let _ = running.wait_for(|running| !*running).await;
        info!("shutdown complete");
    }
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("status", &self.queue_status())
            .finish()
    }
}

/// Pending outcome of an enqueued request.
///
/// Resolves to [`QueueError::Abandoned`] if the queue's tasks are dropped
/// before the request settles.
#[must_use = "a ticket does nothing unless awaited"]
#[derive(Debug)]
pub struct Ticket<T> {
    id: RequestId,
    rx: oneshot::Receiver<Reply<T>>,
}

impl<T> Ticket<T> {
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl<T> Future for Ticket<T> {
    type Output = Result<T, QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(QueueError::Abandoned)))
    }
}
