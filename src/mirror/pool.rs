//! Counting token pool bounding simultaneous clone/fetch operations

use crate::error::{PipelineError, PipelineResult};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Default number of concurrent mirror operations
pub const DEFAULT_MAX_CONCURRENCY: usize = 20;

/// Shared limiter passed explicitly to whoever runs mirror operations.
///
/// Cloning the pool shares the underlying permits.
#[derive(Clone, Debug)]
pub struct TokenPool {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

/// A held token; released when dropped, on every exit path
#[derive(Debug)]
pub struct PoolToken {
    _permit: OwnedSemaphorePermit,
}

impl TokenPool {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a token. Fails with [`PipelineError::Cancelled`] if the run is
    /// cancelled while waiting or the pool has been closed.
    pub async fn acquire(&self, cancel: &CancellationToken) -> PipelineResult<PoolToken> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            permit = self.semaphore.clone().acquire_owned() => permit
                .map(|p| PoolToken { _permit: p })
                .map_err(|_| PipelineError::Cancelled),
        }
    }

    /// Stop admitting new acquisitions; holders keep their tokens
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

impl Default for TokenPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}
