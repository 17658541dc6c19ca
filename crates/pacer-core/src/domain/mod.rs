//! Domain - ID、エラー分類、判断、イベント、オプション

pub mod decision;
pub mod errors;
pub mod events;
pub mod ids;
pub mod options;

pub use decision::{Decider, Decision, DefaultDecider, RetryState};
pub use errors::{ErrorKind, OperationError};
pub use events::QueueEvent;
pub use ids::{BatchId, RequestId};
pub use options::SubmitOptions;
