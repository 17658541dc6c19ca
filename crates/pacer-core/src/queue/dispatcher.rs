//! Dispatcher - 待機キューから実行へ移す単一タスク
//!
//! # フロー
//! 1. 期限の来たリトライを優先度を上げて待機キューへ戻す
//! 2. 仕事が何も残っていなければ終了
//! 3. 同時実行数・日次枠・間隔・分単位枠を確認
//! 4. 先頭のリクエストを取り出して `JoinSet` で実行
//! 5. 完了した試行を `finish` で成功/リトライ/失敗に振り分ける
//!
//! # 学習ポイント
//! - `parking_lot::Mutex` は `.await` をまたいで保持しない
//! - ロック中に作ったイベントは解放後に発行する (シンクからキューを呼べる)
//! - `tokio::select!` で通知・完了・タイマーを同時に待つ

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use super::budget::{Admission, DailyBudget, MinuteWindow};
use super::pending::{PendingQueue, ScheduledRetries};
use super::record::QueueItem;
use crate::config::QueueConfig;
use crate::domain::{Decider, Decision, OperationError, QueueEvent, RetryState};
use crate::error::QueueError;
use crate::impls::BroadcastEventSink;
use crate::observability::QueueCounts;
use crate::ports::{Clock, EventSink, IdGenerator};

/// Everything a queue handle and its dispatcher share.
pub(crate) struct Shared {
    pub state: Mutex<QueueState>,
    pub wake: Notify,
    /// Mirrors `QueueState::running` for shutdown waiters.
    pub running: watch::Sender<bool>,
    pub decider: Arc<dyn Decider>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub broadcast: BroadcastEventSink,
    pub sinks: Vec<Arc<dyn EventSink>>,
}

pub(crate) struct QueueState {
    pub pending: PendingQueue,
    pub retries: ScheduledRetries,
    /// Attempts in flight.
    pub active: usize,
    /// A dispatcher task is alive.
    pub running: bool,
    pub accepting: bool,
    pub concurrency_limit: usize,
    pub min_request_interval: Duration,
    pub poll_interval: Duration,
    pub retry_priority_boost: i32,
    pub last_dispatch: Option<Instant>,
    pub daily: DailyBudget,
    pub minute: MinuteWindow,
    pub counts: QueueCounts,
}

impl QueueState {
    pub fn new(config: &QueueConfig, clock: &dyn Clock) -> Self {
        Self {
            pending: PendingQueue::default(),
            retries: ScheduledRetries::default(),
            active: 0,
            running: false,
            accepting: true,
            concurrency_limit: config.concurrency_limit,
            min_request_interval: config.min_request_interval,
            poll_interval: config.poll_interval,
            retry_priority_boost: config.retry_priority_boost,
            last_dispatch: None,
            daily: DailyBudget::new(config.daily_limit, clock.now().date_naive()),
            minute: MinuteWindow::new(config.per_minute_limit),
            counts: QueueCounts::default(),
        }
    }

    pub fn set_running(&mut self, running: bool, tx: &watch::Sender<bool>) {
        self.running = running;
        tx.send_replace(running);
    }
}

type Attempted = (QueueItem, Result<(), OperationError>);

enum Step {
    Dispatch(QueueItem),
    /// Something changed without a dispatch; evaluate again right away.
    Again,
    Wait(Instant),
    Exit,
}

impl Shared {
    pub fn emit_all(&self, events: &[QueueEvent]) {
        for event in events {
            self.broadcast.emit(event);
            for sink in &self.sinks {
                sink.emit(event);
            }
        }
    }

    fn next_step(&self) -> (Step, Vec<QueueEvent>) {
        let mut events = Vec::new();
        let mut state = self.state.lock();
        let now = Instant::now();

        let mut promoted = false;
        while let Some(mut item) = state.retries.pop_due(now) {
            item.requeue(state.retry_priority_boost);
            debug!(id = %item.id, priority = item.priority, "retry back in queue");
            events.push(QueueEvent::OperationRetried {
                id: item.id,
                attempt: item.retry_count,
            });
            state.pending.push(item);
            promoted = true;
        }
        if promoted {
            events.push(QueueEvent::QueueUpdated {
                size: state.pending.len(),
            });
        }

        if state.pending.is_empty() && state.retries.is_empty() && state.active == 0 {
            state.set_running(false, &self.running);
            return (Step::Exit, events);
        }

        let mut wake_at = now + state.poll_interval;
        if let Some(due) = state.retries.next_due() {
            wake_at = wake_at.min(due);
        }

        if state.pending.is_empty() || state.active >= state.concurrency_limit {
            return (Step::Wait(wake_at), events);
        }

        let today = self.clock.now().date_naive();
        let active = state.active;
        match state.daily.admit(today, active) {
            Admission::Open => {}
            // a completion wakes the loop through `join_next`
            Admission::Hold => return (Step::Wait(wake_at), events),
            Admission::Exhausted(limit) => {
                if let Some(mut item) = state.pending.pop_front() {
                    let rejection = QueueError::DailyLimitExceeded { limit };
                    info!(id = %item.id, limit, "daily request limit reached, rejecting");
                    item.reject(rejection.clone());
                    state.counts.rejected += 1;
                    events.push(QueueEvent::OperationFailed {
                        id: item.id,
                        error: rejection.to_string(),
                    });
                    events.push(QueueEvent::QueueUpdated {
                        size: state.pending.len(),
                    });
                }
                return (Step::Again, events);
            }
        }

        if let Some(last) = state.last_dispatch {
            let ready_at = last + state.min_request_interval;
            if ready_at > now {
                return (Step::Wait(wake_at.min(ready_at)), events);
            }
        }

        if let Some(window_end) = state.minute.full_until(now) {
            return (Step::Wait(wake_at.min(window_end)), events);
        }

        let Some(mut item) = state.pending.pop_front() else {
            return (Step::Wait(wake_at), events);
        };
        item.start_attempt();
        state.active += 1;
        state.last_dispatch = Some(now);
        state.minute.record(now);
        debug!(
            id = %item.id,
            attempt = item.attempts(),
            priority = item.priority,
            active = state.active,
            "dispatching"
        );
        events.push(QueueEvent::QueueUpdated {
            size: state.pending.len(),
        });
        (Step::Dispatch(item), events)
    }

    fn finish(&self, joined: Result<Attempted, JoinError>) {
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();
            state.active = state.active.saturating_sub(1);

            match joined {
                Err(err) => {
                    // the item went down with the task; its caller sees Abandoned
                    error!(error = %err, "execution task did not complete");
                }
                Ok((mut item, Ok(()))) => {
                    item.mark_succeeded();
                    state.counts.completed += 1;
                    let today = self.clock.now().date_naive();
                    state.daily.record_success(today);
                    events.push(QueueEvent::OperationCompleted {
                        id: item.id,
                        success: true,
                    });
                }
                Ok((mut item, Err(err))) => {
                    let retry_state = RetryState {
                        retry_count: item.retry_count,
                        max_retries: item.max_retries,
                        policy: item.retry_policy,
                    };
                    match self.decider.decide(&retry_state, &err) {
                        Decision::Retry { .. } if !state.accepting => {
                            warn!(id = %item.id, error = %err, "shutting down, not retrying");
                            item.reject(QueueError::ShutdownInProgress);
                            state.counts.rejected += 1;
                            events.push(QueueEvent::OperationFailed {
                                id: item.id,
                                error: QueueError::ShutdownInProgress.to_string(),
                            });
                        }
                        Decision::Retry { delay, reason } => {
                            info!(
                                id = %item.id,
                                kind = %err.kind(),
                                error = %err,
                                delay_ms = delay.as_millis() as u64,
                                %reason,
                                "attempt failed, retry scheduled"
                            );
                            item.schedule_retry(err);
                            state.counts.retried += 1;
                            state.retries.schedule(Instant::now() + delay, item);
                        }
                        Decision::Fail { reason } => {
                            let id = item.id;
                            let rejection = item.mark_failed(err);
                            warn!(%id, error = %rejection, %reason, "operation failed");
                            state.counts.failed += 1;
                            events.push(QueueEvent::OperationFailed {
                                id,
                                error: rejection.to_string(),
                            });
                        }
                    }
                }
            }
        }
        self.emit_all(&events);
    }
}

/// Dispatcher loop. Runs until pending, scheduled and in-flight work are all
/// empty; the next submission starts a new one.
pub(crate) async fn run(shared: Arc<Shared>) {
    let mut in_flight: JoinSet<Attempted> = JoinSet::new();
    debug!("dispatcher started");

    loop {
        while let Some(joined) = in_flight.try_join_next() {
            shared.finish(joined);
        }

        let (step, events) = shared.next_step();
        shared.emit_all(&events);

        match step {
            Step::Dispatch(item) => {
                in_flight.spawn(execute(item));
            }
            Step::Again => {}
            Step::Wait(deadline) => {
                tokio::select! {
                    _ = shared.wake.notified() => {}
                    Some(joined) = in_flight.join_next() => shared.finish(joined),
                    _ = sleep_until(deadline) => {}
                }
            }
            Step::Exit => break,
        }
    }

    debug!("dispatcher idle, exiting");
}

/// Run one attempt. Panics in the operation and elapsed timeouts come back as
/// operation errors.
async fn execute(mut item: QueueItem) -> Attempted {
    let started = panic::catch_unwind(AssertUnwindSafe(|| item.operation.attempt()));
    let result = match started {
        Ok(attempt) => guarded(attempt, item.timeout).await,
        Err(payload) => Err(panicked(payload)),
    };
    (item, result)
}

async fn guarded(
    attempt: BoxFuture<'static, Result<(), OperationError>>,
    timeout: Option<Duration>,
) -> Result<(), OperationError> {
    let attempt = AssertUnwindSafe(attempt).catch_unwind();
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, attempt).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(OperationError::transient(format!(
                    "attempt timed out after {} ms",
                    limit.as_millis()
                )));
            }
        },
        None => attempt.await,
    };
    outcome.unwrap_or_else(|payload| Err(panicked(payload)))
}

fn panicked(payload: Box<dyn Any + Send>) -> OperationError {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    OperationError::unknown(format!("operation panicked: {detail}"))
}
