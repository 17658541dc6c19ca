//! BroadcastEventSink - 購読者へのイベント配信
//!
//! 遅い購読者は古いイベントから取りこぼす。キューは購読者を待たない。

use tokio::sync::broadcast;

use crate::domain::QueueEvent;
use crate::ports::EventSink;

#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<QueueEvent>,
}

impl BroadcastEventSink {
    /// `capacity` must be non-zero.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: &QueueEvent) {
        // no subscribers is fine
        let _ = self.sender.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let sink = BroadcastEventSink::new(8);
        let mut rx = sink.subscribe();

        sink.emit(&QueueEvent::QueueUpdated { size: 1 });
        sink.emit(&QueueEvent::QueueCleared { count: 1 });

        assert_eq!(rx.recv().await.unwrap(), QueueEvent::QueueUpdated { size: 1 });
        assert_eq!(rx.recv().await.unwrap(), QueueEvent::QueueCleared { count: 1 });
    }

    #[test]
    fn emitting_without_subscribers_is_harmless() {
        let sink = BroadcastEventSink::new(1);
        sink.emit(&QueueEvent::QueueUpdated { size: 0 });
        assert_eq!(sink.subscriber_count(), 0);
    }
}
