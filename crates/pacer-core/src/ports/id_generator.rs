//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: `Clock` のタイムスタンプ + 乱数ビットの ULID

use crate::domain::ids::{BatchId, RequestId};
use crate::ports::Clock;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    fn generate_request_id(&self) -> RequestId;

    fn generate_batch_id(&self) -> BatchId;
}

/// ULID-based generator.
///
/// The timestamp half comes from the clock, so a `FixedClock` yields ids with a
/// known timestamp and random suffixes.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_request_id(&self) -> RequestId {
        RequestId::from(self.next_ulid())
    }

    fn generate_batch_id(&self) -> BatchId {
        BatchId::from(self.next_ulid())
    }
}
