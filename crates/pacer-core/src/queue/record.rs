//! Queue item: metadata + operation.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::RequestState;
use super::operation::Operation;
use super::retry::RetryPolicy;
use crate::domain::{OperationError, RequestId, SubmitOptions};
use crate::error::QueueError;

/// One submitted operation and its retry bookkeeping.
///
/// Owned by exactly one place at a time (pending queue, an executing task, or
/// the retry schedule); the value is moved between them, never shared.
pub(crate) struct QueueItem {
    pub id: RequestId,
    pub operation: Box<dyn Operation>,
    pub state: RequestState,

    /// Retries already made.
    pub retry_count: u32,
    pub max_retries: u32,

    /// Higher is serviced first. Boosted on every retry.
    pub priority: i32,

    pub retry_policy: RetryPolicy,
    pub timeout: Option<Duration>,

    pub submitted_at: DateTime<Utc>,
    pub last_error: Option<OperationError>,
}

impl QueueItem {
    pub fn new(
        id: RequestId,
        operation: Box<dyn Operation>,
        options: &SubmitOptions,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            operation,
            state: RequestState::Pending,
            retry_count: 0,
            max_retries: options.max_retries,
            priority: options.priority,
            retry_policy: options.retry_policy(),
            timeout: options.timeout,
            submitted_at,
            last_error: None,
        }
    }

    /// Attempts made so far, including the one in flight.
    pub fn attempts(&self) -> u32 {
        self.retry_count + 1
    }

    pub fn start_attempt(&mut self) {
        self.state = RequestState::Executing;
    }

    /// Move to RetryScheduled after a retryable failure.
    pub fn schedule_retry(&mut self, error: OperationError) {
        self.state = RequestState::RetryScheduled;
        self.retry_count += 1;
        self.last_error = Some(error);
    }

    /// Back to Pending with boosted priority.
    pub fn requeue(&mut self, boost: i32) {
        self.state = RequestState::Pending;
        self.priority = self.priority.saturating_add(boost);
    }

    pub fn mark_succeeded(&mut self) {
        self.state = RequestState::Succeeded;
    }

    /// Reject the caller with the synthesized failure.
    pub fn mark_failed(&mut self, error: OperationError) -> QueueError {
        let rejection = QueueError::Failed {
            attempts: self.attempts(),
            kind: error.kind(),
            message: error.message().to_string(),
        };
        self.state = RequestState::Failed;
        self.last_error = Some(error);
        self.operation.reject(rejection.clone());
        rejection
    }

    pub fn mark_cleared(&mut self) {
        self.state = RequestState::Cleared;
        self.operation.reject(QueueError::Cleared);
    }

    /// Reject for a reason unrelated to the operation itself.
    pub fn reject(&mut self, error: QueueError) {
        self.state = RequestState::Rejected;
        self.operation.reject(error);
    }
}

impl fmt::Debug for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueItem")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("retry_count", &self.retry_count)
            .field("max_retries", &self.max_retries)
            .field("priority", &self.priority)
            .field("submitted_at", &self.submitted_at)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}
