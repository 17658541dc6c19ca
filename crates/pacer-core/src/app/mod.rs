//! App - 組み立てと高レベル API
//!
//! - **QueueBuilder**: config と ports から `RequestQueue` を組み立てる
//! - **process_in_chunks**: 固定サイズのチャンク単位でバッチ投入

pub mod batch;
pub mod builder;

pub use self::batch::{ChunkOptions, process_in_chunks};
pub use self::builder::QueueBuilder;
