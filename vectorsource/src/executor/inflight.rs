//! Table of live fetch tasks keyed by coordinate.
//!
//! A coordinate has at most one live ticket. A second request for the same
//! coordinate is coalesced onto it until the task settles or is cancelled.

use std::convert::Infallible;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use super::task::TaskTicket;
use crate::coord::TileCoordinate;

/// Result of [`InFlightTable::admit`].
#[derive(Debug)]
pub(crate) enum Registration<E> {
    /// A live ticket already exists; nothing was issued.
    Coalesced,
    /// A new ticket was issued and admitted.
    Admitted,
    /// The admission closure refused the ticket; the table is unchanged.
    Refused(E),
}

#[derive(Debug, Default)]
pub struct InFlightTable {
    tickets: DashMap<TileCoordinate, TaskTicket>,
}

impl InFlightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a ticket for `coordinate` unless a live one already exists.
    ///
    /// Returns `None` when the request should be coalesced.
    pub fn register(
        &self,
        coordinate: TileCoordinate,
        parent: &CancellationToken,
    ) -> Option<TaskTicket> {
        let mut issued = None;
        let registration = self.admit(coordinate, parent, |ticket| {
            issued = Some(ticket);
            Ok::<(), Infallible>(())
        });
        match registration {
            Registration::Admitted => issued,
            Registration::Coalesced | Registration::Refused(_) => None,
        }
    }

    /// Issues a ticket and hands it to `admit`, all under the entry lock for
    /// `coordinate`.
    ///
    /// The ticket only becomes visible to other submitters if `admit`
    /// succeeds, so nobody can coalesce onto a task that was never queued.
    pub(crate) fn admit<E, F>(
        &self,
        coordinate: TileCoordinate,
        parent: &CancellationToken,
        admit: F,
    ) -> Registration<E>
    where
        F: FnOnce(TaskTicket) -> Result<(), E>,
    {
        match self.tickets.entry(coordinate) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_cancelled() {
                    return Registration::Coalesced;
                }
                let ticket = TaskTicket::issue(parent);
                match admit(ticket.clone()) {
                    Ok(()) => {
                        entry.insert(ticket);
                        Registration::Admitted
                    }
                    Err(e) => {
                        entry.remove();
                        Registration::Refused(e)
                    }
                }
            }
            Entry::Vacant(entry) => {
                let ticket = TaskTicket::issue(parent);
                match admit(ticket.clone()) {
                    Ok(()) => {
                        entry.insert(ticket);
                        Registration::Admitted
                    }
                    Err(e) => Registration::Refused(e),
                }
            }
        }
    }

    /// Runs `deliver` if task `id` still owns `coordinate`.
    ///
    /// The entry stays locked while `deliver` runs: [`cancel`](Self::cancel)
    /// and [`cancel_matching`](Self::cancel_matching) wait for a delivery in
    /// progress, and no delivery starts once they return. `deliver` must not
    /// call back into this table.
    pub(crate) fn deliver_if_current<R>(
        &self,
        coordinate: TileCoordinate,
        id: u64,
        deliver: impl FnOnce() -> R,
    ) -> Option<R> {
        let entry = self.tickets.get(&coordinate)?;
        if entry.id() != id || entry.is_cancelled() {
            return None;
        }
        let result = deliver();
        drop(entry);
        Some(result)
    }

    /// Releases the ticket for a settled task.
    ///
    /// Only removes the entry if it still belongs to task `id`; a newer
    /// ticket for the same coordinate is left alone.
    pub fn complete(&self, coordinate: TileCoordinate, id: u64) {
        self.tickets.remove_if(&coordinate, |_, ticket| ticket.id() == id);
    }

    /// Cancels and forgets the live ticket for `coordinate`.
    pub fn cancel(&self, coordinate: TileCoordinate) -> bool {
        match self.tickets.remove(&coordinate) {
            Some((_, ticket)) => {
                ticket.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every ticket whose coordinate matches `predicate`.
    pub fn cancel_matching<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&TileCoordinate) -> bool,
    {
        let mut cancelled = 0;
        self.tickets.retain(|coordinate, ticket| {
            if predicate(coordinate) {
                ticket.cancel();
                cancelled += 1;
                false
            } else {
                true
            }
        });
        cancelled
    }

    pub fn contains(&self, coordinate: &TileCoordinate) -> bool {
        self.tickets.contains_key(coordinate)
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Cancels and removes every ticket.
    pub fn clear(&self) {
        self.cancel_matching(|_| true);
    }
}
