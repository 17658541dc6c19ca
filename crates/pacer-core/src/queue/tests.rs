use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep};

use super::*;
use crate::app::QueueBuilder;
use crate::domain::ErrorKind;
use crate::ports::FixedClock;

fn queue(concurrency: usize) -> RequestQueue {
    QueueBuilder::new()
        .concurrency_limit(concurrency)
        .min_request_interval(Duration::from_millis(500))
        .without_event_logging()
        .build()
        .unwrap()
}

/// Let the dispatcher record the outcome of a request whose ticket already
/// resolved.
async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

fn quick_retries() -> SubmitOptions {
    SubmitOptions::default().with_base_delay(Duration::from_millis(100))
}

/// Operation that fails with `errors` in order, then returns `value`.
fn scripted<T: Clone + Send + 'static>(
    errors: Vec<OperationError>,
    value: T,
    calls: Arc<AtomicUsize>,
) -> impl FnMut() -> futures::future::Ready<Result<T, OperationError>> + Send + 'static {
    move || {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(match errors.get(call) {
            Some(err) => Err(err.clone()),
            None => Ok(value.clone()),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn higher_priority_runs_first() {
    let queue = queue(1);
    let order = Arc::new(Mutex::new(Vec::new()));

    let tickets: Vec<_> = [1, 10, 5]
        .into_iter()
        .map(|priority| {
            let order = Arc::clone(&order);
            queue.enqueue(
                move || {
                    order.lock().push(priority);
                    async { Ok::<_, OperationError>(()) }
                },
                SubmitOptions::default().with_priority(priority),
            )
        })
        .collect();
    join_all(tickets).await;

    assert_eq!(*order.lock(), vec![10, 5, 1]);
}

#[tokio::test(start_paused = true)]
async fn never_exceeds_concurrency_limit() {
    let queue = queue(2);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tickets: Vec<_> = (0..5)
        .map(|n| {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            queue.enqueue(
                move || {
                    let current = Arc::clone(&current);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_secs(3)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, OperationError>(n)
                    }
                },
                SubmitOptions::default(),
            )
        })
        .collect();

    sleep(Duration::from_millis(600)).await;
    let status = queue.queue_status();
    assert_eq!(status.active_requests, 2);
    assert_eq!(status.queue_length, 3);

    let results: Vec<_> = join_all(tickets).await.into_iter().map(Result::unwrap).collect();
    assert_eq!(results, vec![0, 1, 2, 3, 4]);
    assert_eq!(peak.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn dispatches_are_spaced_by_min_interval() {
    let queue = QueueBuilder::new()
        .concurrency_limit(5)
        .min_request_interval(Duration::from_secs(1))
        .without_event_logging()
        .build()
        .unwrap();
    let starts = Arc::new(Mutex::new(Vec::new()));

    let tickets: Vec<_> = (0..4)
        .map(|_| {
            let starts = Arc::clone(&starts);
            queue.enqueue(
                move || {
                    starts.lock().push(Instant::now());
                    async { Ok::<_, OperationError>(()) }
                },
                SubmitOptions::default(),
            )
        })
        .collect();
    join_all(tickets).await;

    let starts = starts.lock();
    assert_eq!(starts.len(), 4);
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_secs(1));
    }
}

#[tokio::test(start_paused = true)]
async fn retryable_failures_are_retried_until_success() {
    let queue = queue(1);
    let calls = Arc::new(AtomicUsize::new(0));

    let result = queue
        .submit(
            scripted(
                vec![
                    OperationError::transient("503 service unavailable"),
                    OperationError::rate_limited("429 rate limit"),
                ],
                "done",
                Arc::clone(&calls),
            ),
            quick_retries(),
        )
        .await;

    assert_eq!(result, Ok("done"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    settle().await;
    let counts = queue.counts();
    assert_eq!(counts.retried, 2);
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.failed, 0);
}

#[tokio::test(start_paused = true)]
async fn unauthorized_is_not_retried() {
    let queue = queue(1);
    let calls = Arc::new(AtomicUsize::new(0));

    let err = queue
        .submit(
            scripted(
                vec![OperationError::from_message("Request failed: 401 Unauthorized")],
                (),
                Arc::clone(&calls),
            ),
            quick_retries(),
        )
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(err.attempts(), Some(1));
    assert_eq!(err.kind(), Some(ErrorKind::Unauthorized));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_report_every_attempt() {
    let queue = queue(1);
    let calls = Arc::new(AtomicUsize::new(0));
    let always_limited = vec![OperationError::rate_limited("quota exceeded"); 10];

    let err = queue
        .submit(
            scripted(always_limited, (), Arc::clone(&calls)),
            quick_retries().with_max_retries(2),
        )
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(err.attempts(), Some(3));
    assert_eq!(err.to_string(), "operation failed after 3 attempt(s): quota exceeded");
}

#[tokio::test(start_paused = true)]
async fn rate_limited_twice_then_ok_emits_retry_events() {
    let queue = queue(1);
    let mut events = queue.subscribe();
    let calls = Arc::new(AtomicUsize::new(0));
    let limited = OperationError::rate_limited("rate limit");

    let ticket = queue.enqueue(
        scripted(vec![limited.clone(), limited], "ok".to_string(), Arc::clone(&calls)),
        SubmitOptions::default().with_max_retries(2).with_priority(5),
    );
    let id = ticket.id();

    assert_eq!(ticket.await, Ok("ok".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    settle().await;
    let mut retried = Vec::new();
    let mut completed = None;
    while let Ok(event) = events.try_recv() {
        match event {
            QueueEvent::OperationRetried { id: rid, attempt } if rid == id => retried.push(attempt),
            QueueEvent::OperationCompleted { id: cid, success } if cid == id => completed = Some(success),
            _ => {}
        }
    }
    assert_eq!(retried, vec![1, 2]);
    assert_eq!(completed, Some(true));
}

#[tokio::test(start_paused = true)]
async fn retried_request_is_boosted_ahead_of_equal_work() {
    let queue = queue(1);
    let order = Arc::new(Mutex::new(Vec::new()));
    let first_try = Arc::new(AtomicUsize::new(0));

    let log = Arc::clone(&order);
    let flaky = queue.enqueue(
        move || {
            log.lock().push("flaky");
            let fail = first_try.fetch_add(1, Ordering::SeqCst) == 0;
            async move {
                if fail {
                    Err(OperationError::transient("overloaded"))
                } else {
                    Ok(())
                }
            }
        },
        quick_retries(),
    );
    // let the first attempt start before the competition arrives
    sleep(Duration::from_millis(1)).await;

    let others: Vec<_> = (0..3)
        .map(|_| {
            let log = Arc::clone(&order);
            queue.enqueue(
                move || {
                    log.lock().push("other");
                    async { Ok::<_, OperationError>(()) }
                },
                SubmitOptions::default().with_priority(5),
            )
        })
        .collect();

    flaky.await.unwrap();
    join_all(others).await;

    assert_eq!(*order.lock(), vec!["flaky", "flaky", "other", "other", "other"]);
}

#[tokio::test(start_paused = true)]
async fn clear_queue_rejects_pending_only() {
    let queue = queue(1);

    let running = queue.enqueue(
        || async {
            sleep(Duration::from_secs(10)).await;
            Ok::<_, OperationError>(0)
        },
        SubmitOptions::default(),
    );
    let waiting: Vec<_> = (1..=3)
        .map(|n| queue.enqueue(move || async move { Ok::<_, OperationError>(n) }, SubmitOptions::default()))
        .collect();

    sleep(Duration::from_millis(10)).await;
    assert_eq!(queue.queue_status().active_requests, 1);

    assert_eq!(queue.clear_queue(), 3);
    assert_eq!(queue.queue_status().queue_length, 0);

    for outcome in join_all(waiting).await {
        assert_eq!(outcome, Err(QueueError::Cleared));
    }
    assert_eq!(running.await, Ok(0));
    assert_eq!(queue.counts().cleared, 3);
}

#[tokio::test(start_paused = true)]
async fn panicking_operation_fails_as_unknown() {
    let queue = queue(1);

    let err = queue
        .submit(
            || async {
                if true {
                    panic!("provider client bug");
                }
                Ok::<u8, OperationError>(0)
            },
            quick_retries(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Unknown));
    assert_eq!(err.attempts(), Some(1));
    assert!(err.to_string().contains("provider client bug"));
}

#[tokio::test(start_paused = true)]
async fn timed_out_attempts_are_transient() {
    let queue = queue(1);
    let calls = Arc::new(AtomicUsize::new(0));

    let counted = Arc::clone(&calls);
    let err = queue
        .submit(
            move || {
                counted.fetch_add(1, Ordering::SeqCst);
                async {
                    sleep(Duration::from_secs(60)).await;
                    Ok::<_, OperationError>(())
                }
            },
            quick_retries()
                .with_max_retries(1)
                .with_timeout(Duration::from_secs(1)),
        )
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(err.kind(), Some(ErrorKind::Transient));
    assert_eq!(err.attempts(), Some(2));
}

#[tokio::test(start_paused = true)]
async fn daily_limit_rejects_until_the_date_changes() {
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()));
    let queue = QueueBuilder::new()
        .concurrency_limit(5)
        .min_request_interval(Duration::from_millis(500))
        .daily_limit(100)
        .clock(clock.clone())
        .without_event_logging()
        .build()
        .unwrap();

    let tickets: Vec<_> = (0..100)
        .map(|n| queue.enqueue(move || async move { Ok::<_, OperationError>(n) }, SubmitOptions::default()))
        .collect();
    assert!(join_all(tickets).await.iter().all(Result::is_ok));
    settle().await;
    assert_eq!(queue.queue_status().requests_today, 100);

    let over = queue
        .submit(|| async { Ok::<_, OperationError>(()) }, SubmitOptions::default())
        .await;
    assert_eq!(over, Err(QueueError::DailyLimitExceeded { limit: 100 }));
    assert_eq!(queue.counts().rejected, 1);

    clock.advance(chrono::Duration::days(1));
    assert_eq!(queue.queue_status().requests_today, 0);
    let next_day = queue
        .submit(|| async { Ok::<_, OperationError>(()) }, SubmitOptions::default())
        .await;
    assert_eq!(next_day, Ok(()));
}

#[tokio::test(start_paused = true)]
async fn daily_limit_counts_requests_in_flight() {
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()));
    let queue = QueueBuilder::new()
        .concurrency_limit(5)
        .min_request_interval(Duration::from_millis(500))
        .daily_limit(100)
        .clock(clock)
        .without_event_logging()
        .build()
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let tickets: Vec<_> = (0..110)
        .map(|n| {
            let calls = Arc::clone(&calls);
            queue.enqueue(
                move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        sleep(Duration::from_secs(3)).await;
                        Ok::<_, OperationError>(n)
                    }
                },
                SubmitOptions::default(),
            )
        })
        .collect();
    let outcomes = join_all(tickets).await;
    settle().await;

    let succeeded = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(succeeded, 100);
    assert!(
        outcomes
            .iter()
            .filter_map(|outcome| outcome.as_ref().err())
            .all(|err| *err == QueueError::DailyLimitExceeded { limit: 100 })
    );
    assert_eq!(calls.load(Ordering::SeqCst), 100);
    assert_eq!(queue.queue_status().requests_today, 100);
    assert_eq!(queue.counts().rejected, 10);
}

#[tokio::test(start_paused = true)]
async fn per_minute_limit_holds_requests_until_the_window_ends() {
    let queue = QueueBuilder::new()
        .concurrency_limit(5)
        .min_request_interval(Duration::from_millis(500))
        .per_minute_limit(3)
        .without_event_logging()
        .build()
        .unwrap();
    let starts = Arc::new(Mutex::new(Vec::new()));

    let tickets: Vec<_> = (0..5)
        .map(|n| {
            let starts = Arc::clone(&starts);
            queue.enqueue(
                move || {
                    starts.lock().push(Instant::now());
                    async move { Ok::<_, OperationError>(n) }
                },
                SubmitOptions::default(),
            )
        })
        .collect();

    sleep(Duration::from_secs(5)).await;
    let status = queue.queue_status();
    assert_eq!(status.requests_this_minute, 3);
    assert_eq!(status.per_minute_limit, Some(3));
    assert_eq!(status.queue_length, 2);

    let results: Vec<_> = join_all(tickets).await.into_iter().map(Result::unwrap).collect();
    assert_eq!(results, vec![0, 1, 2, 3, 4]);
    assert_eq!(queue.counts().rejected, 0);

    let starts = starts.lock();
    assert!(starts[2] - starts[0] < Duration::from_secs(60));
    assert!(starts[3] - starts[0] >= Duration::from_secs(60));
    assert!(starts[4] - starts[3] < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn reset_daily_count_reopens_the_budget() {
    let queue = QueueBuilder::new()
        .concurrency_limit(5)
        .min_request_interval(Duration::from_millis(500))
        .without_event_logging()
        .build()
        .unwrap();
    assert_eq!(queue.set_daily_limit(1), 100);

    let tickets: Vec<_> = (0..100)
        .map(|_| queue.enqueue(|| async { Ok::<_, OperationError>(()) }, SubmitOptions::default()))
        .collect();
    join_all(tickets).await;
    settle().await;

    queue.reset_daily_count();
    assert_eq!(queue.queue_status().requests_today, 0);
    assert_eq!(
        queue.submit(|| async { Ok::<_, OperationError>(7) }, SubmitOptions::default()).await,
        Ok(7)
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_rejects_waiting_work_and_drains_in_flight() {
    let queue = queue(1);

    let in_flight = queue.enqueue(
        || async {
            sleep(Duration::from_secs(5)).await;
            Ok::<_, OperationError>("finished")
        },
        SubmitOptions::default(),
    );
    let waiting = queue.enqueue(|| async { Ok::<_, OperationError>("never") }, SubmitOptions::default());
    sleep(Duration::from_millis(10)).await;

    queue.shutdown().await;

    assert_eq!(in_flight.await, Ok("finished"));
    assert_eq!(waiting.await, Err(QueueError::ShutdownInProgress));

    let late = queue
        .submit(|| async { Ok::<_, OperationError>("late") }, SubmitOptions::default())
        .await;
    assert_eq!(late, Err(QueueError::ShutdownInProgress));

    let status = queue.queue_status();
    assert!(!status.accepting);
    assert!(!status.is_processing);
    assert_eq!(status.counts.rejected, 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_drops_scheduled_retries() {
    let queue = queue(1);
    let calls = Arc::new(AtomicUsize::new(0));

    let ticket = queue.enqueue(
        scripted(vec![OperationError::transient("timeout")], (), Arc::clone(&calls)),
        SubmitOptions::default().with_base_delay(Duration::from_secs(10)),
    );
    sleep(Duration::from_millis(10)).await;
    assert_eq!(queue.queue_status().retry_scheduled, 1);

    queue.shutdown().await;

    assert_eq!(ticket.await, Err(QueueError::ShutdownInProgress));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn dispatcher_stops_when_idle_and_restarts_on_submit() {
    let queue = queue(1);

    assert_eq!(queue.submit(|| async { Ok::<_, OperationError>(1) }, SubmitOptions::default()).await, Ok(1));
    sleep(Duration::from_millis(10)).await;
    assert!(!queue.queue_status().is_processing);

    assert_eq!(queue.submit(|| async { Ok::<_, OperationError>(2) }, SubmitOptions::default()).await, Ok(2));
}

#[tokio::test(start_paused = true)]
async fn concurrency_limit_changes_apply_to_running_queue() {
    let queue = queue(1);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tickets: Vec<_> = (0..6)
        .map(|n| {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            queue.enqueue(
                move || {
                    let current = Arc::clone(&current);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_secs(5)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, OperationError>(n)
                    }
                },
                SubmitOptions::default(),
            )
        })
        .collect();

    sleep(Duration::from_secs(1)).await;
    assert_eq!(queue.queue_status().active_requests, 1);
    queue.set_concurrent_limit(3);

    // dispatched at 1.0s and 1.5s
    sleep(Duration::from_secs(1)).await;
    assert_eq!(queue.queue_status().active_requests, 3);
    assert_eq!(peak.load(Ordering::SeqCst), 3);

    // lowering the limit lets in-flight work finish
    queue.set_concurrent_limit(1);
    sleep(Duration::from_millis(3_500)).await;
    let status = queue.queue_status();
    assert_eq!(status.active_requests, 2);
    assert_eq!(status.queue_length, 3);

    sleep(Duration::from_millis(1_500)).await;
    let status = queue.queue_status();
    assert_eq!(status.active_requests, 1);
    assert_eq!(status.queue_length, 2);

    peak.store(1, Ordering::SeqCst);
    let results: Vec<_> = join_all(tickets).await.into_iter().map(Result::unwrap).collect();
    assert_eq!(results, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn interval_change_spaces_later_dispatches() {
    let queue = queue(5);
    let starts = Arc::new(Mutex::new(Vec::new()));

    let tickets: Vec<_> = (0..5)
        .map(|_| {
            let starts = Arc::clone(&starts);
            queue.enqueue(
                move || {
                    starts.lock().push(Instant::now());
                    async { Ok::<_, OperationError>(()) }
                },
                SubmitOptions::default(),
            )
        })
        .collect();

    sleep(Duration::from_millis(600)).await;
    queue.set_min_request_interval(Duration::from_secs(2));
    join_all(tickets).await;

    let starts = starts.lock();
    assert_eq!(starts.len(), 5);
    assert!(starts[1] - starts[0] < Duration::from_secs(1));
    for pair in starts[1..].windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_secs(2));
    }
}

#[tokio::test]
async fn setters_clamp_their_input() {
    let queue = queue(1);

    assert_eq!(queue.set_concurrent_limit(0), 1);
    assert_eq!(queue.set_concurrent_limit(12), 5);
    assert_eq!(queue.set_min_request_interval(Duration::from_millis(100)), Duration::from_millis(500));
    assert_eq!(queue.set_min_request_interval(Duration::from_secs(3)), Duration::from_secs(3));
    assert_eq!(queue.set_per_minute_limit(0), 1);

    let status = queue.queue_status();
    assert_eq!(status.concurrency_limit, 5);
    assert_eq!(status.min_request_interval_ms, 3_000);
    assert_eq!(status.per_minute_limit, Some(1));
}

#[tokio::test]
async fn ticket_without_sender_is_abandoned() {
    let (tx, rx) = oneshot::channel::<Reply<u8>>();
    drop(tx);
    let ticket = Ticket {
        id: RequestId::from_ulid(ulid::Ulid::new()),
        rx,
    };
    assert_eq!(ticket.await, Err(QueueError::Abandoned));
}

#[tokio::test(start_paused = true)]
async fn submission_emits_queue_updated() {
    let queue = queue(1);
    let mut events = queue.subscribe();

    let ticket = queue.enqueue(|| async { Ok::<_, OperationError>(()) }, SubmitOptions::default());
    assert_eq!(events.recv().await.unwrap(), QueueEvent::QueueUpdated { size: 1 });
    ticket.await.unwrap();
}
