//! TracingEventSink - キューイベントごとに構造化ログを 1 行

use tracing::{debug, info, warn};

use crate::domain::QueueEvent;
use crate::ports::EventSink;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &QueueEvent) {
        match event {
            QueueEvent::QueueUpdated { size } => {
                debug!(event = event.name(), size, "queue updated");
            }
            QueueEvent::OperationCompleted { id, success } => {
                info!(event = event.name(), %id, success, "operation completed");
            }
            QueueEvent::OperationRetried { id, attempt } => {
                info!(event = event.name(), %id, attempt, "operation retried");
            }
            QueueEvent::OperationFailed { id, error } => {
                warn!(event = event.name(), %id, error = %error, "operation failed");
            }
            QueueEvent::QueueCleared { count } => {
                info!(event = event.name(), count, "queue cleared");
            }
        }
    }
}
