//! Events - キューイベント
//!
//! 接続されたすべての `EventSink` に発行される。列挙は閉じているので
//! 受け手は網羅的に match できる。

use serde::{Deserialize, Serialize};

use super::ids::RequestId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum QueueEvent {
    /// A submission changed the pending queue length.
    QueueUpdated { size: usize },

    /// An operation settled successfully.
    OperationCompleted { id: RequestId, success: bool },

    /// A failed operation re-entered the pending queue. `attempt` is the
    /// retry number (1 for the first retry).
    OperationRetried { id: RequestId, attempt: u32 },

    /// An operation was rejected for good.
    OperationFailed { id: RequestId, error: String },

    /// `clear_queue` rejected `count` pending items.
    QueueCleared { count: usize },
}

impl QueueEvent {
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::QueueUpdated { .. } => "queueUpdated",
            QueueEvent::OperationCompleted { .. } => "operationCompleted",
            QueueEvent::OperationRetried { .. } => "operationRetried",
            QueueEvent::OperationFailed { .. } => "operationFailed",
            QueueEvent::QueueCleared { .. } => "queueCleared",
        }
    }

    /// Request the event is about, if any.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            QueueEvent::OperationCompleted { id, .. }
            | QueueEvent::OperationRetried { id, .. }
            | QueueEvent::OperationFailed { id, .. } => Some(*id),
            QueueEvent::QueueUpdated { .. } | QueueEvent::QueueCleared { .. } => None,
        }
    }
}
