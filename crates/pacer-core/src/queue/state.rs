//! Request state machine for the queue.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one queued request.
///
/// State transitions:
/// - Pending -> Executing -> Succeeded
/// - Pending -> Executing -> RetryScheduled -> Pending (until retries run out)
/// - Pending -> Executing -> Failed
/// - Pending -> Cleared (administrator cleared the queue)
/// - Pending | RetryScheduled -> Rejected (daily limit or shutdown)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Waiting in the priority queue.
    Pending,

    /// Operation in flight.
    Executing,

    /// Waiting out a backoff delay before going back to Pending.
    RetryScheduled,

    Succeeded,

    /// Non-retryable error or retry budget exhausted.
    Failed,

    Cleared,

    Rejected,
}

impl RequestState {
    /// Is this a terminal state (caller already settled)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::Succeeded
                | RequestState::Failed
                | RequestState::Cleared
                | RequestState::Rejected
        )
    }

    /// Can the dispatcher pick this request up?
    pub fn is_dispatchable(self) -> bool {
        matches!(self, RequestState::Pending)
    }
}
