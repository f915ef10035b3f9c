//! Result delivery back to the owning source.
//!
//! Workers never own the source they deliver to. A [`ResultSink`] holds a weak
//! reference; if the owner has been destroyed by the time a fetch finishes,
//! delivery is a silent no-op.

use std::fmt;
use std::sync::{Arc, Weak};

use super::task::FetchOutcome;
use crate::coord::TileCoordinate;
use crate::feature::FeatureCollection;

/// Tile-data installation entry point of a result consumer.
///
/// Called from any worker, concurrently for distinct coordinates.
/// Implementations must be internally synchronized, and must not call back
/// into the dispatcher: the coordinate's in-flight entry is locked for the
/// duration of the call.
pub trait TileDataSink: Send + Sync + 'static {
    fn install_tile_data(&self, coordinate: TileCoordinate, data: FeatureCollection);
}

/// Weak delivery handle shared by every task of one dispatcher.
#[derive(Clone)]
pub struct ResultSink {
    owner: Weak<dyn TileDataSink>,
}

impl ResultSink {
    /// Creates a sink that delivers to `owner` without keeping it alive.
    pub fn new<S: TileDataSink>(owner: &Arc<S>) -> Self {
        let owner: Weak<S> = Arc::downgrade(owner);
        Self { owner }
    }

    /// Creates a sink from an already type-erased owner.
    pub fn from_dyn(owner: &Arc<dyn TileDataSink>) -> Self {
        Self {
            owner: Arc::downgrade(owner),
        }
    }

    /// Returns true while the owner is still alive.
    pub fn is_owner_alive(&self) -> bool {
        self.owner.strong_count() > 0
    }

    /// Installs `data` into the owner if it still exists.
    pub fn deliver(&self, coordinate: TileCoordinate, data: FeatureCollection) -> FetchOutcome {
        match self.owner.upgrade() {
            Some(owner) => {
                owner.install_tile_data(coordinate, data);
                FetchOutcome::Delivered
            }
            None => FetchOutcome::OwnerGone,
        }
    }
}

impl fmt::Debug for ResultSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSink")
            .field("owner_alive", &self.is_owner_alive())
            .finish()
    }
}
