//! Tile fetch dispatcher.
//!
//! The [`TileDispatcher`] is the public face of the dispatch core. It owns
//! the queue, the in-flight table and the worker pool, and exposes the
//! submission path used by the rendering engine:
//!
//! ```text
//! request_fetch(z, x, y)
//!        │
//!        ▼
//! ┌──────────────┐  live ticket  ┌───────────┐
//! │ InFlightTable│──────────────►│ Coalesced │
//! └──────┬───────┘               └───────────┘
//!        │ new ticket
//!        ▼
//! ┌──────────────┐     full      ┌───────────┐
//! │DispatchQueue │──────────────►│ QueueFull │
//! └──────┬───────┘               └───────────┘
//!        │ Accepted
//!        ▼
//! ┌──────────────┐
//! │  WorkerPool  │──► ProviderLimiter ──► provider.fetch ──► ResultSink ──► owner
//! └──────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! let dispatcher = TileDispatcher::start(config, provider, ResultSink::new(&owner))?;
//! match dispatcher.request_fetch(14, 8192, 5461) {
//!     Ok(Admission::Accepted) | Ok(Admission::Coalesced) => {}
//!     Err(DispatchError::QueueFull { .. }) => { /* engine will ask again */ }
//!     Err(e) => return Err(e),
//! }
//! dispatcher.shutdown().await;
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::{ConfigError, DispatchConfig};
use super::inflight::{InFlightTable, Registration};
use super::limiter::ProviderLimiter;
use super::pool::{WorkerPool, WorkerShared};
use super::queue::{DispatchQueue, EnqueueError};
use super::sink::ResultSink;
use super::stats::{DispatchStats, StatsSnapshot};
use super::task::FetchTask;
use crate::coord::TileCoordinate;
use crate::provider::TileProvider;

/// Result of a successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A new task was queued.
    Accepted,
    /// A live task for the same coordinate already exists.
    Coalesced,
}

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The task was still queued and has been removed.
    Dequeued,
    /// The task was executing; its result will not be delivered.
    Abandoned,
    /// No live task existed for the coordinate.
    NotFound,
}

/// Errors surfaced to the submission path.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The pending queue is at capacity.
    #[error("Dispatch queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The dispatcher no longer accepts work.
    #[error("Dispatcher has been shut down")]
    ShutDown,

    /// The source does not serve tiles at this zoom level.
    #[error("Zoom level {zoom} outside source range {min}-{max}")]
    ZoomOutOfRange { zoom: u8, min: u8, max: u8 },

    /// No tokio runtime to run workers on.
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Schedules provider fetches onto a fixed worker pool and delivers the
/// results through a weak sink.
///
/// Dropping the dispatcher closes it: queued tasks are discarded, in-flight
/// tasks are cancelled and workers exit. Use [`TileDispatcher::shutdown`] to
/// also wait for the workers.
pub struct TileDispatcher {
    config: DispatchConfig,
    queue: Arc<DispatchQueue>,
    in_flight: Arc<InFlightTable>,
    stats: Arc<DispatchStats>,
    provider: Arc<dyn TileProvider>,
    sink: ResultSink,
    shutdown: CancellationToken,
    pool: Mutex<Option<WorkerPool>>,
}

impl TileDispatcher {
    /// Starts a dispatcher on the current tokio runtime.
    pub fn start(
        config: DispatchConfig,
        provider: Arc<dyn TileProvider>,
        sink: ResultSink,
    ) -> Result<Self, DispatchError> {
        let handle = Handle::try_current().map_err(|e| DispatchError::NoRuntime(e.to_string()))?;
        Self::start_on(&handle, config, provider, sink)
    }

    /// Starts a dispatcher whose workers run on `handle`.
    pub fn start_on(
        handle: &Handle,
        config: DispatchConfig,
        provider: Arc<dyn TileProvider>,
        sink: ResultSink,
    ) -> Result<Self, DispatchError> {
        config.validate()?;

        let queue = Arc::new(DispatchQueue::new(config.queue_capacity));
        let in_flight = Arc::new(InFlightTable::new());
        let stats = Arc::new(DispatchStats::new());
        let shutdown = CancellationToken::new();

        let shared = Arc::new(WorkerShared {
            queue: Arc::clone(&queue),
            in_flight: Arc::clone(&in_flight),
            stats: Arc::clone(&stats),
            limiter: ProviderLimiter::new(config.pool_size, Arc::clone(&stats)),
            fetch_timeout: config.fetch_timeout,
        });
        let pool = WorkerPool::spawn(handle, config.pool_size, shared, shutdown.clone());

        info!(
            provider = provider.name(),
            queue_capacity = config.queue_capacity,
            pool_size = config.pool_size,
            fetch_timeout_ms = config.fetch_timeout.as_millis() as u64,
            "Tile dispatcher started"
        );

        Ok(Self {
            config,
            queue,
            in_flight,
            stats,
            provider,
            sink,
            shutdown,
            pool: Mutex::new(Some(pool)),
        })
    }

    /// Requests a fetch for tile `z/x/y`. Never blocks.
    pub fn request_fetch(&self, z: u8, x: u32, y: u32) -> Result<Admission, DispatchError> {
        self.submit(TileCoordinate::new(z, x, y))
    }

    /// Requests a fetch for `coordinate`. Never blocks.
    ///
    /// The ticket is published only once its task is in the queue, so a
    /// request can never coalesce onto a task that was refused.
    pub fn submit(&self, coordinate: TileCoordinate) -> Result<Admission, DispatchError> {
        if self.shutdown.is_cancelled() {
            return Err(DispatchError::ShutDown);
        }

        let registration = self.in_flight.admit(coordinate, &self.shutdown, |ticket| {
            let task = FetchTask::new(
                coordinate,
                Arc::clone(&self.provider),
                self.sink.clone(),
                ticket,
            );
            self.queue.try_enqueue(task)
        });

        match registration {
            Registration::Coalesced => {
                self.stats.record_coalesced();
                debug!(tile = %coordinate, "Fetch coalesced with live task");
                Ok(Admission::Coalesced)
            }
            Registration::Admitted => {
                self.stats.record_accepted();
                debug!(tile = %coordinate, queued = self.queue.len(), "Fetch accepted");
                Ok(Admission::Accepted)
            }
            Registration::Refused(EnqueueError::Full(_)) => {
                self.stats.record_rejected();
                warn!(
                    tile = %coordinate,
                    capacity = self.config.queue_capacity,
                    "Dispatch queue full, fetch rejected"
                );
                Err(DispatchError::QueueFull {
                    capacity: self.config.queue_capacity,
                })
            }
            Registration::Refused(EnqueueError::Closed(_)) => Err(DispatchError::ShutDown),
        }
    }

    /// Cancels the fetch for tile `z/x/y`.
    pub fn cancel_fetch(&self, z: u8, x: u32, y: u32) -> CancelOutcome {
        self.cancel(TileCoordinate::new(z, x, y))
    }

    /// Best-effort cancellation.
    ///
    /// A queued task is removed. An executing task keeps running but its
    /// result is discarded. If delivery has already started, this waits for
    /// it to finish; no delivery for the coordinate's task starts afterwards.
    pub fn cancel(&self, coordinate: TileCoordinate) -> CancelOutcome {
        let removed = self.queue.remove_matching(|t| t.coordinate() == coordinate);
        let was_live = self.in_flight.cancel(coordinate);

        if !removed.is_empty() {
            self.stats.record_dequeued_cancelled(removed.len());
            debug!(tile = %coordinate, "Queued fetch cancelled");
            CancelOutcome::Dequeued
        } else if was_live {
            debug!(tile = %coordinate, "In-flight fetch abandoned");
            CancelOutcome::Abandoned
        } else {
            CancelOutcome::NotFound
        }
    }

    /// Cancels every queued or executing fetch whose coordinate matches.
    ///
    /// Returns the number of live tasks cancelled.
    pub fn cancel_matching<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&TileCoordinate) -> bool,
    {
        let removed = self.queue.remove_matching(|t| predicate(&t.coordinate()));
        if !removed.is_empty() {
            self.stats.record_dequeued_cancelled(removed.len());
        }
        self.in_flight.cancel_matching(predicate)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Number of tasks waiting for a worker.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Number of coordinates with a live (queued or executing) task.
    pub fn live_tasks(&self) -> usize {
        self.in_flight.len()
    }

    /// Returns true if a live task exists for `coordinate`.
    pub fn is_pending(&self, coordinate: &TileCoordinate) -> bool {
        self.in_flight.contains(coordinate)
    }

    /// Number of worker tasks still running.
    pub fn live_workers(&self) -> usize {
        self.pool.lock().as_ref().map_or(0, WorkerPool::live_workers)
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stops accepting work, discards queued tasks and cancels in-flight ones.
    ///
    /// Idempotent. Workers exit at their next loop iteration.
    pub fn close(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }

        let drained = self.queue.close();
        self.shutdown.cancel();
        self.in_flight.clear();
        if !drained.is_empty() {
            self.stats.record_dequeued_cancelled(drained.len());
        }

        info!(discarded = drained.len(), "Tile dispatcher closed");
    }

    /// Closes the dispatcher and waits for every worker to exit.
    pub async fn shutdown(self) {
        self.close();
        let pool = self.pool.lock().take();
        if let Some(pool) = pool {
            pool.join().await;
        }
    }
}

impl Drop for TileDispatcher {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TileDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileDispatcher")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("live_tasks", &self.in_flight.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
