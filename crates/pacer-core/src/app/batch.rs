//! Batch - チャンク単位のバッチ処理

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info};

use crate::domain::{OperationError, SubmitOptions};
use crate::error::QueueError;
use crate::queue::RequestQueue;

#[derive(Debug, Clone)]
pub struct ChunkOptions {
    /// Inputs submitted together. 0 is treated as 1.
    pub chunk_size: usize,

    /// Pause after each chunk except the last.
    pub delay_between_chunks: Duration,

    /// Options for every submitted request.
    pub submit: SubmitOptions,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            chunk_size: 5,
            delay_between_chunks: Duration::from_secs(60),
            submit: SubmitOptions::default(),
        }
    }
}

/// Run `processor` over `inputs` through `queue`, a chunk at a time.
///
/// Results come back in input order. The first error ends the batch: the
/// current chunk is allowed to settle, later chunks are never submitted.
pub async fn process_in_chunks<I, T, P, Fut>(
    queue: &RequestQueue,
    inputs: Vec<I>,
    processor: P,
    options: ChunkOptions,
) -> Result<Vec<T>, QueueError>
where
    I: Clone + Send + 'static,
    T: Send + 'static,
    P: Fn(I) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<T, OperationError>> + Send + 'static,
{
    let batch_id = queue.generate_batch_id();
    let chunk_size = options.chunk_size.max(1);
    let total_chunks = inputs.len().div_ceil(chunk_size);
    info!(%batch_id, inputs = inputs.len(), chunk_size, total_chunks, "batch started");

    let mut results = Vec::with_capacity(inputs.len());
    for (index, chunk) in inputs.chunks(chunk_size).enumerate() {
        debug!(%batch_id, chunk = index + 1, total_chunks, "submitting chunk");

        let tickets = chunk.iter().cloned().map(|input| {
            let processor = processor.clone();
            queue.enqueue(move || processor(input.clone()), options.submit.clone())
        });
        for outcome in join_all(tickets).await {
            results.push(outcome?);
        }

        if index + 1 < total_chunks {
            tokio::time::sleep(options.delay_between_chunks).await;
        }
    }

    info!(%batch_id, results = results.len(), "batch finished");
    Ok(results)
}
