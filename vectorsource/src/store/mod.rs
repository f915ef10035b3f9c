//! Tile data storage.
//!
//! A [`TileStore`] holds the feature collections installed for each tile and
//! answers source queries. Installation is called from dispatcher workers,
//! concurrently for distinct coordinates, so implementations must be
//! internally synchronized.
//!
//! A worker installs while holding the dispatcher's lock on that coordinate,
//! which keeps invalidation and delivery from interleaving. Store methods
//! must therefore never call back into the source or its dispatcher.

mod memory;

pub use memory::MemoryTileStore;

use crate::coord::{LatLngBounds, TileCoordinate};
use crate::feature::{Feature, FeatureCollection, FeatureFilter};

/// Storage backend of a custom vector source.
pub trait TileStore: Send + Sync + 'static {
    /// Installs (or replaces) the data for one tile.
    fn install_tile_data(&self, coordinate: TileCoordinate, data: FeatureCollection);

    /// Drops the data for one tile. Returns true if data was present.
    fn invalidate_tile(&self, coordinate: TileCoordinate) -> bool;

    /// Drops the data of every tile intersecting `bounds`.
    ///
    /// Returns the number of tiles removed.
    fn invalidate_region(&self, bounds: &LatLngBounds) -> usize;

    /// Returns stored features matching `filter`.
    ///
    /// `None` means the store has nothing to answer with.
    fn query_features(&self, filter: Option<&FeatureFilter>) -> Option<Vec<Feature>>;
}
