//! Type-erased operations and their reply slot.
//!
//! The queue stores operations of different output types side by side, so each
//! submission is wrapped in a `TypedOperation<T, F>` and boxed as
//! `dyn Operation`. The caller's oneshot sender lives in a `ReplySlot` that is
//! taken on settlement, which makes double settlement impossible.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::domain::OperationError;
use crate::error::QueueError;

pub(crate) type Reply<T> = Result<T, QueueError>;

/// Take-once holder for the caller's sender.
pub(crate) struct ReplySlot<T> {
    tx: Mutex<Option<oneshot::Sender<Reply<T>>>>,
}

impl<T> ReplySlot<T> {
    pub(crate) fn new(tx: oneshot::Sender<Reply<T>>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    /// Deliver the outcome. Returns false if the slot was already settled.
    pub(crate) fn settle(&self, reply: Reply<T>) -> bool {
        match self.tx.lock().take() {
            Some(tx) => {
                // receiver may be gone; the request still counts as settled
                let _ = tx.send(reply);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.tx.lock().is_none()
    }
}

/// One submitted operation with its output type erased.
pub(crate) trait Operation: Send {
    /// Start one attempt. On success the returned future has already resolved
    /// the caller.
    fn attempt(&mut self) -> BoxFuture<'static, Result<(), OperationError>>;

    /// Reject the caller. No-op if already settled.
    fn reject(&mut self, error: QueueError);

    fn is_settled(&self) -> bool;
}

pub(crate) struct TypedOperation<T, F> {
    factory: F,
    reply: Arc<ReplySlot<T>>,
}

impl<T, F> TypedOperation<T, F> {
    pub(crate) fn new(factory: F, tx: oneshot::Sender<Reply<T>>) -> Self {
        Self {
            factory,
            reply: Arc::new(ReplySlot::new(tx)),
        }
    }
}

impl<T, F, Fut> Operation for TypedOperation<T, F>
where
    T: Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, OperationError>> + Send + 'static,
{
    fn attempt(&mut self) -> BoxFuture<'static, Result<(), OperationError>> {
        let call = (self.factory)();
        let reply = Arc::clone(&self.reply);
        Box::pin(async move {
            let value = call.await?;
            reply.settle(Ok(value));
            Ok(())
        })
    }

    fn reject(&mut self, error: QueueError) {
        self.reply.settle(Err(error));
    }

    fn is_settled(&self) -> bool {
        self.reply.is_settled()
    }
}
