//! Dispatcher counters.
//!
//! Counters are observability only; admission never consults them.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

use super::task::FetchOutcome;

/// Live counters updated by the submission path and the workers.
#[derive(Debug, Default)]
pub struct DispatchStats {
    accepted: AtomicU64,
    coalesced: AtomicU64,
    rejected: AtomicU64,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    provider_calls: AtomicUsize,
    peak_provider_calls: AtomicUsize,
    delivered: AtomicU64,
    owner_gone: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    panicked: AtomicU64,
    cancelled: AtomicU64,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Tasks removed from the queue before a worker picked them up.
    pub(crate) fn record_dequeued_cancelled(&self, count: usize) {
        self.cancelled.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_started(&self) {
        let now = self.active.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_active.fetch_max(now, Ordering::AcqRel);
    }

    pub(crate) fn record_finished(&self, outcome: &FetchOutcome) {
        let counter = match outcome {
            FetchOutcome::Delivered => &self.delivered,
            FetchOutcome::OwnerGone => &self.owner_gone,
            FetchOutcome::Failed(_) => &self.failed,
            FetchOutcome::TimedOut => &self.timed_out,
            FetchOutcome::Panicked(_) => &self.panicked,
            FetchOutcome::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_sub(1, Ordering::AcqRel);
    }

    /// A provider call started on the blocking pool.
    pub(crate) fn record_call_started(&self) {
        let now = self.provider_calls.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_provider_calls.fetch_max(now, Ordering::AcqRel);
    }

    /// A provider call returned or unwound, whether or not a worker still
    /// waits for it.
    pub(crate) fn record_call_finished(&self) {
        self.provider_calls.fetch_sub(1, Ordering::AcqRel);
    }

    /// Number of fetches currently executing.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Acquire),
            peak_active: self.peak_active.load(Ordering::Acquire),
            provider_calls: self.provider_calls.load(Ordering::Acquire),
            peak_provider_calls: self.peak_provider_calls.load(Ordering::Acquire),
            delivered: self.delivered.load(Ordering::Relaxed),
            owner_gone: self.owner_gone.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Fetches admitted into the queue.
    pub accepted: u64,
    /// Requests answered by an already live task.
    pub coalesced: u64,
    /// Requests refused because the queue was full.
    pub rejected: u64,
    /// Fetches executing right now.
    pub active: usize,
    /// Highest concurrent execution count observed.
    pub peak_active: usize,
    /// Provider calls running on the blocking pool, including abandoned ones.
    pub provider_calls: usize,
    /// Highest concurrent provider call count observed.
    pub peak_provider_calls: usize,
    /// Fetches whose data was installed into the owner.
    pub delivered: u64,
    /// Fetches that finished after the owner was destroyed.
    pub owner_gone: u64,
    /// Fetches whose provider returned an error.
    pub failed: u64,
    /// Fetches whose provider call exceeded the timeout.
    pub timed_out: u64,
    /// Fetches whose provider or installation panicked.
    pub panicked: u64,
    /// Fetches cancelled while queued or before delivery.
    pub cancelled: u64,
}

impl StatsSnapshot {
    /// Admitted fetches that reached a terminal state.
    pub fn settled(&self) -> u64 {
        self.delivered
            + self.owner_gone
            + self.failed
            + self.timed_out
            + self.panicked
            + self.cancelled
    }

    /// Admitted fetches still queued or executing.
    pub fn outstanding(&self) -> u64 {
        self.accepted.saturating_sub(self.settled())
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accepted={} coalesced={} rejected={} active={} peak={} calls={} peak_calls={} \
             delivered={} owner_gone={} failed={} timed_out={} panicked={} cancelled={}",
            self.accepted,
            self.coalesced,
            self.rejected,
            self.active,
            self.peak_active,
            self.provider_calls,
            self.peak_provider_calls,
            self.delivered,
            self.owner_gone,
            self.failed,
            self.timed_out,
            self.panicked,
            self.cancelled
        )
    }
}
