//! In-memory tile store backed by `DashMap`.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::TileStore;
use crate::coord::{LatLngBounds, TileCoordinate};
use crate::feature::{Feature, FeatureCollection, FeatureFilter};

/// Concurrent map of installed tile data.
///
/// Collections are stored behind `Arc` so readers never hold a shard lock
/// while iterating features.
#[derive(Debug, Default)]
pub struct MemoryTileStore {
    tiles: DashMap<TileCoordinate, Arc<FeatureCollection>>,
}

impl MemoryTileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tiles with installed data.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn contains(&self, coordinate: &TileCoordinate) -> bool {
        self.tiles.contains_key(coordinate)
    }

    /// Returns the data installed for `coordinate`.
    pub fn tile(&self, coordinate: &TileCoordinate) -> Option<Arc<FeatureCollection>> {
        self.tiles.get(coordinate).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns every stored coordinate, ordered by zoom, then x, then y.
    pub fn coordinates(&self) -> Vec<TileCoordinate> {
        let mut coordinates: Vec<_> = self.tiles.iter().map(|entry| *entry.key()).collect();
        coordinates.sort_unstable_by_key(|c| (c.zoom, c.x, c.y));
        coordinates
    }
}

impl TileStore for MemoryTileStore {
    fn install_tile_data(&self, coordinate: TileCoordinate, data: FeatureCollection) {
        debug!(tile = %coordinate, features = data.len(), "Installing tile data");
        self.tiles.insert(coordinate, Arc::new(data));
    }

    fn invalidate_tile(&self, coordinate: TileCoordinate) -> bool {
        self.tiles.remove(&coordinate).is_some()
    }

    fn invalidate_region(&self, bounds: &LatLngBounds) -> usize {
        let before = self.tiles.len();
        self.tiles.retain(|coordinate, _| !coordinate.covers(bounds));
        before.saturating_sub(self.tiles.len())
    }

    fn query_features(&self, filter: Option<&FeatureFilter>) -> Option<Vec<Feature>> {
        if self.tiles.is_empty() {
            return None;
        }

        let features = self
            .coordinates()
            .into_iter()
            .filter_map(|coordinate| self.tile(&coordinate))
            .flat_map(|tile| {
                tile.iter()
                    .filter(|f| filter.map_or(true, |filter| filter.matches(f)))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();

        Some(features)
    }
}
