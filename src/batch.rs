//! Chunked bulk mutations under the backend's per-call operation ceiling.
//!
//! Each chunk is one atomic backend call. Chunks run sequentially and the run
//! stops at the first failing chunk; chunks that already succeeded stay applied.

use std::future::Future;

use tracing::{debug, warn};

use crate::error::{BackendError, BatchError};
use crate::metrics;

/// Bulk-operation ceiling of the event source.
pub const MAX_BATCH_OPERATIONS: usize = 500;

/// Result of a chunked run.
///
/// `succeeded` counts items from the front of the input: the first `succeeded`
/// items were mutated, the rest were not attempted or belong to the failed chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedOutcome {
    pub succeeded: usize,
    pub error: Option<BackendError>,
}

impl ChunkedOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<usize, BackendError> {
        match self.error {
            None => Ok(self.succeeded),
            Some(err) => Err(err),
        }
    }

    /// Like [`into_result`](Self::into_result), keeping the applied count on failure.
    pub fn into_batch_result(self) -> Result<usize, BatchError> {
        match self.error {
            None => Ok(self.succeeded),
            Some(err) => Err(BatchError {
                succeeded: self.succeeded,
                error: err.into(),
            }),
        }
    }
}

/// Split `items` into contiguous chunks of at most `chunk_size` and call `mutate`
/// once per chunk, in order.
///
/// An empty input returns immediately without calling `mutate`. A `chunk_size`
/// of zero is treated as one.
pub async fn apply_in_chunks<T, F, Fut>(items: &[T], chunk_size: usize, mut mutate: F) -> ChunkedOutcome
where
    T: Clone,
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = Result<(), BackendError>>,
{
    let chunk_size = chunk_size.max(1);
    let mut succeeded = 0;

    for chunk in items.chunks(chunk_size) {
        if let Err(err) = mutate(chunk.to_vec()).await {
            return ChunkedOutcome {
                succeeded,
                error: Some(err),
            };
        }
        succeeded += chunk.len();
    }

    ChunkedOutcome {
        succeeded,
        error: None,
    }
}

/// [`apply_in_chunks`] with a fixed chunk size, logging and metrics.
#[derive(Debug, Clone, Copy)]
pub struct BatchExecutor {
    chunk_size: usize,
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new(MAX_BATCH_OPERATIONS)
    }
}

impl BatchExecutor {
    /// Chunk size is clamped to `1..=MAX_BATCH_OPERATIONS`.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.clamp(1, MAX_BATCH_OPERATIONS),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Run `mutate` over `items` in chunks. `operation` labels logs and metrics.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, items: &[T], mut mutate: F) -> ChunkedOutcome
    where
        T: Clone,
        F: FnMut(Vec<T>) -> Fut,
        Fut: Future<Output = Result<(), BackendError>>,
    {
        if items.is_empty() {
            return ChunkedOutcome {
                succeeded: 0,
                error: None,
            };
        }

        let total_chunks = items.len().div_ceil(self.chunk_size);
        debug!(
            "Running {} over {} items in {} chunks of at most {}",
            operation,
            items.len(),
            total_chunks,
            self.chunk_size
        );

        let outcome = apply_in_chunks(items, self.chunk_size, |chunk| {
            let len = chunk.len();
            let fut = mutate(chunk);
            async move {
                let result = fut.await;
                metrics::record_batch_chunk(operation, result.is_ok());
                if result.is_ok() {
                    debug!("{} chunk of {} items applied", operation, len);
                }
                result
            }
        })
        .await;

        if let Some(err) = &outcome.error {
            warn!(
                "{} stopped after {} of {} items: {}",
                operation,
                outcome.succeeded,
                items.len(),
                err
            );
        }

        outcome
    }
}
