//! Concurrency limit for provider calls.
//!
//! A worker can stop waiting for a provider call (timeout, cancellation) but
//! the call itself keeps running on the blocking pool. The permit is moved
//! into the blocking closure, so it is held until the call really returns:
//! no more than `permits` provider calls ever run at once, abandoned ones
//! included.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::stats::DispatchStats;

/// Semaphore-based limiter shared by the workers of one dispatcher.
#[derive(Debug, Clone)]
pub struct ProviderLimiter {
    semaphore: Arc<Semaphore>,
    permits: usize,
    stats: Arc<DispatchStats>,
}

/// Permission to run one provider call.
///
/// Counts as a running call in [`DispatchStats`] until dropped.
#[derive(Debug)]
pub struct ProviderPermit {
    _permit: OwnedSemaphorePermit,
    stats: Arc<DispatchStats>,
}

impl ProviderLimiter {
    pub fn new(permits: usize, stats: Arc<DispatchStats>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            permits,
            stats,
        }
    }

    /// Waits for a free slot.
    ///
    /// Returns `None` only if the semaphore was closed.
    pub async fn acquire(&self) -> Option<ProviderPermit> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await.ok()?;
        self.stats.record_call_started();
        Some(ProviderPermit {
            _permit: permit,
            stats: Arc::clone(&self.stats),
        })
    }

    /// Number of slots not held by a running call.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn permits(&self) -> usize {
        self.permits
    }
}

impl Drop for ProviderPermit {
    fn drop(&mut self) {
        self.stats.record_call_finished();
    }
}
