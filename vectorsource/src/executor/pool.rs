//! Fixed-size worker pool.
//!
//! Each worker is a long-lived tokio task running
//! dequeue → execute → deliver → repeat until the dispatcher shuts down.
//! Provider errors, timeouts and panics end at the worker boundary: the task
//! is dropped and the worker moves on, so pool capacity never shrinks.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::inflight::InFlightTable;
use super::limiter::ProviderLimiter;
use super::queue::DispatchQueue;
use super::stats::DispatchStats;
use super::task::FetchOutcome;
use crate::coord::TileCoordinate;

/// State shared by every worker of one pool.
pub(crate) struct WorkerShared {
    pub(crate) queue: Arc<DispatchQueue>,
    pub(crate) in_flight: Arc<InFlightTable>,
    pub(crate) stats: Arc<DispatchStats>,
    pub(crate) limiter: ProviderLimiter,
    pub(crate) fetch_timeout: Duration,
}

/// Handles of the running workers.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `size` workers on `handle`.
    pub(crate) fn spawn(
        handle: &Handle,
        size: usize,
        shared: Arc<WorkerShared>,
        shutdown: CancellationToken,
    ) -> Self {
        let workers = (0..size)
            .map(|worker_id| {
                handle.spawn(run_worker(
                    worker_id,
                    Arc::clone(&shared),
                    shutdown.clone(),
                ))
            })
            .collect();

        info!(workers = size, "Fetch worker pool started");
        Self { workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Number of workers whose task has not finished.
    pub fn live_workers(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_finished()).count()
    }

    /// Waits for every worker to exit.
    pub(crate) async fn join(self) {
        for result in join_all(self.workers).await {
            if let Err(e) = result {
                warn!(error = %e, "Fetch worker ended abnormally");
            }
        }
        info!("Fetch worker pool stopped");
    }
}

async fn run_worker(worker_id: usize, shared: Arc<WorkerShared>, shutdown: CancellationToken) {
    debug!(worker_id, "Fetch worker started");

    loop {
        let task = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            task = shared.queue.dequeue() => match task {
                Some(task) => task,
                None => break,
            },
        };

        let coordinate = task.coordinate();
        let id = task.id();
        let waited = task.wait_time();

        shared.stats.record_started();
        let outcome = task
            .execute(&shared.limiter, &shared.in_flight, shared.fetch_timeout)
            .await;
        shared.stats.record_finished(&outcome);
        shared.in_flight.complete(coordinate, id);

        log_outcome(worker_id, coordinate, &outcome, waited);
    }

    debug!(worker_id, "Fetch worker stopped");
}

fn log_outcome(worker_id: usize, tile: TileCoordinate, outcome: &FetchOutcome, waited: Duration) {
    let waited_ms = waited.as_millis() as u64;
    match outcome {
        FetchOutcome::Delivered => {
            debug!(worker_id, %tile, waited_ms, "Tile data delivered");
        }
        FetchOutcome::OwnerGone => {
            debug!(worker_id, %tile, "Source gone, dropping tile data");
        }
        FetchOutcome::Cancelled => {
            debug!(worker_id, %tile, "Fetch cancelled");
        }
        FetchOutcome::Failed(e) => {
            warn!(worker_id, %tile, error = %e, "Tile fetch failed, dropping");
        }
        FetchOutcome::TimedOut => {
            warn!(worker_id, %tile, "Tile fetch timed out, dropping");
        }
        FetchOutcome::Panicked(msg) => {
            warn!(worker_id, %tile, panic = %msg, "Tile fetch panicked, dropping");
        }
    }
}
