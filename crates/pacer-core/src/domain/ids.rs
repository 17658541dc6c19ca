//! Ids - 型付き識別子
//!
//! どの ID も ULID (48 bit のミリ秒タイムスタンプ + 80 bit の乱数) を
//! phantom 型付きの `Id<T>` で包んだもの。`BatchId` の場所に `RequestId` は渡せない。
//! ID はログと相関付け専用で、キュー内の要素を ID で引くことはない。
//!
//! # 学習ポイント
//! - `PhantomData` による型レベルの区別
//! - `#[repr(transparent)]` と `#[serde(transparent)]` で中身は `Ulid` そのもの

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait for identifier kinds.
///
/// Supplies the prefix used by `Display` ("req-", "batch-").
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic identifier.
///
/// `T` only exists at compile time; `Id<T>` has the same size as `Ulid`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    /// Milliseconds since the Unix epoch encoded in the identifier.
    pub fn timestamp_ms(&self) -> u64 {
        self.ulid.timestamp_ms()
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Marker for submitted requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Request {}

impl IdMarker for Request {
    fn prefix() -> &'static str {
        "req-"
    }
}

/// Marker for chunked batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Batch {}

impl IdMarker for Batch {
    fn prefix() -> &'static str {
        "batch-"
    }
}

/// Identifier of one submitted operation (one `QueueItem`).
pub type RequestId = Id<Request>;

/// Identifier of one `process_in_chunks` run.
pub type BatchId = Id<Batch>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_prefix() {
        let request = RequestId::from_ulid(Ulid::new());
        let batch = BatchId::from_ulid(Ulid::new());

        assert!(request.to_string().starts_with("req-"));
        assert!(batch.to_string().starts_with("batch-"));

        // let _: BatchId = request; // does not compile
    }

    #[test]
    fn ids_serialize_as_bare_ulid() {
        let ulid = Ulid::new();
        let id = RequestId::from_ulid(ulid);

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{ulid}\""));

        let back: RequestId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn timestamp_is_preserved() {
        let ulid = Ulid::from_parts(1_700_000_000_000, 42);
        let id: RequestId = ulid.into();
        assert_eq!(id.timestamp_ms(), 1_700_000_000_000);
    }

    #[test]
    fn phantom_marker_is_zero_sized() {
        assert_eq!(std::mem::size_of::<RequestId>(), std::mem::size_of::<Ulid>());
    }
}
