//! Impls - ports の実装
//!
//! # 含まれるもの
//! - **BroadcastEventSink**: プロセス内のイベント購読
//! - **TracingEventSink**: イベントを構造化ログとして出力

pub mod broadcast_sink;
pub mod tracing_sink;

pub use self::broadcast_sink::BroadcastEventSink;
pub use self::tracing_sink::TracingEventSink;
