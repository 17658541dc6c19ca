//! pacer-core
//!
//! レート制限のある生成 AI API 向けの、ペース配分・優先度付き・リトライ付き実行キュー。
//!
//! # モジュール構成
//! - **domain**: ID、エラー分類、リトライ判断、イベント、投入オプション
//! - **ports**: Clock, IdGenerator, EventSink
//! - **impls**: BroadcastEventSink, TracingEventSink
//! - **queue**: RequestQueue とディスパッチャ
//! - **app**: QueueBuilder、チャンク単位のバッチ処理
//! - **config**: QueueConfig (既定値、環境変数)
//! - **observability**: QueueStatus スナップショット
//!
//! ```ignore
//! let queue = QueueBuilder::new().config(QueueConfig::from_env()?).build()?;
//! let text = queue
//!     .submit(move || client.generate(prompt.clone()), SubmitOptions::default().with_priority(5))
//!     .await?;
//! ```

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use app::{ChunkOptions, QueueBuilder, process_in_chunks};
pub use config::QueueConfig;
pub use domain::{ErrorKind, OperationError, QueueEvent, RequestId, SubmitOptions};
pub use error::{BuildError, ConfigError, QueueError};
pub use observability::{QueueCounts, QueueStatus};
pub use queue::{RequestQueue, Ticket};
