//! Fetch task and its execution.
//!
//! A [`FetchTask`] binds one tile coordinate to the provider call and to the
//! sink that receives the result. It is created per request, consumed exactly
//! once by a worker and never re-queued.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::inflight::InFlightTable;
use super::limiter::ProviderLimiter;
use super::sink::ResultSink;
use crate::coord::TileCoordinate;
use crate::provider::{ProviderError, TileProvider};

// =============================================================================
// Ticket
// =============================================================================

/// Global sequence counter for task ids.
static TASK_SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn next_task_id() -> u64 {
    TASK_SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// Identity and cancellation handle shared by a task and the in-flight table.
#[derive(Clone, Debug)]
pub struct TaskTicket {
    id: u64,
    token: CancellationToken,
}

impl TaskTicket {
    /// Issues a new ticket whose token is cancelled with `parent`.
    pub(crate) fn issue(parent: &CancellationToken) -> Self {
        Self {
            id: next_task_id(),
            token: parent.child_token(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Terminal state of one fetch task.
///
/// Only `Delivered` results in data reaching the owner. Every other outcome
/// ends at the worker boundary.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Data was installed into the owner.
    Delivered,
    /// The owner was destroyed before delivery.
    OwnerGone,
    /// The provider returned an error.
    Failed(ProviderError),
    /// The provider call exceeded the fetch timeout.
    TimedOut,
    /// The provider or the owner's installation entry point panicked.
    Panicked(String),
    /// The task was cancelled before delivery.
    Cancelled,
}

impl FetchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// Returns true for provider-side failures (error, timeout, panic).
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::TimedOut | Self::Panicked(_))
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivered => write!(f, "delivered"),
            Self::OwnerGone => write!(f, "owner gone"),
            Self::Failed(e) => write!(f, "provider failed: {}", e),
            Self::TimedOut => write!(f, "timed out"),
            Self::Panicked(msg) => write!(f, "panicked: {}", msg),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

// =============================================================================
// Fetch Task
// =============================================================================

/// One queued tile fetch.
pub struct FetchTask {
    coordinate: TileCoordinate,
    provider: Arc<dyn TileProvider>,
    sink: ResultSink,
    ticket: TaskTicket,
    enqueued_at: Instant,
}

impl FetchTask {
    pub(crate) fn new(
        coordinate: TileCoordinate,
        provider: Arc<dyn TileProvider>,
        sink: ResultSink,
        ticket: TaskTicket,
    ) -> Self {
        Self {
            coordinate,
            provider,
            sink,
            ticket,
            enqueued_at: Instant::now(),
        }
    }

    pub fn coordinate(&self) -> TileCoordinate {
        self.coordinate
    }

    pub fn id(&self) -> u64 {
        self.ticket.id()
    }

    pub fn ticket(&self) -> &TaskTicket {
        &self.ticket
    }

    pub fn is_cancelled(&self) -> bool {
        self.ticket.is_cancelled()
    }

    /// Returns how long this task has been waiting since it was created.
    pub fn wait_time(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    /// Runs the provider call and delivers the result.
    ///
    /// The call waits for a slot from `limiter`, then runs on the blocking
    /// pool holding that slot until it returns. The worker stops waiting
    /// (and discards the eventual result) when the call exceeds `timeout` or
    /// the task is cancelled. Waiting for a slot does not count against
    /// `timeout`.
    ///
    /// Delivery happens at most once, through
    /// [`InFlightTable::deliver_if_current`], so it never overlaps with or
    /// follows a cancellation of this task.
    pub(crate) async fn execute(
        self,
        limiter: &ProviderLimiter,
        in_flight: &InFlightTable,
        timeout: Duration,
    ) -> FetchOutcome {
        if self.ticket.is_cancelled() {
            return FetchOutcome::Cancelled;
        }

        let permit = tokio::select! {
            biased;
            _ = self.ticket.token().cancelled() => return FetchOutcome::Cancelled,
            permit = limiter.acquire() => match permit {
                Some(permit) => permit,
                None => return FetchOutcome::Cancelled,
            },
        };

        let provider = Arc::clone(&self.provider);
        let coordinate = self.coordinate;
        let call = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            provider.fetch(coordinate)
        });

        let joined = tokio::select! {
            biased;
            _ = self.ticket.token().cancelled() => return FetchOutcome::Cancelled,
            result = tokio::time::timeout(timeout, call) => result,
        };

        let data = match joined {
            Err(_elapsed) => return FetchOutcome::TimedOut,
            Ok(Err(join_error)) => {
                let message = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    join_error.to_string()
                };
                return FetchOutcome::Panicked(message);
            }
            Ok(Ok(Err(e))) => return FetchOutcome::Failed(e),
            Ok(Ok(Ok(data))) => data,
        };

        let sink = &self.sink;
        let id = self.ticket.id();
        let delivered = catch_unwind(AssertUnwindSafe(|| {
            in_flight.deliver_if_current(coordinate, id, || sink.deliver(coordinate, data))
        }));
        match delivered {
            Ok(Some(outcome)) => outcome,
            Ok(None) => FetchOutcome::Cancelled,
            Err(payload) => FetchOutcome::Panicked(panic_message(payload)),
        }
    }
}

impl fmt::Debug for FetchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchTask")
            .field("coordinate", &self.coordinate)
            .field("id", &self.ticket.id)
            .field("provider", &self.provider.name())
            .field("cancelled", &self.ticket.is_cancelled())
            .finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================
