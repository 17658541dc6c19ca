//! EventSink port - キューイベントの出力先
//!
//! # 実装
//! - `BroadcastEventSink`: プロセス内の購読者へ配信
//! - `TracingEventSink`: イベントごとに構造化ログを 1 行

use crate::domain::QueueEvent;

/// Receives every event the queue emits.
///
/// `emit` is called on the dispatcher's hot path and must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &QueueEvent);
}
