//! Provider trait and error types.

use thiserror::Error;

use crate::coord::{LatLngBounds, TileCoordinate};
use crate::feature::FeatureCollection;

/// Errors a provider may report for a single fetch.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider has nothing for this tile.
    #[error("No data for tile {0}")]
    NoData(TileCoordinate),

    /// Generic provider failure.
    #[error("Provider failed: {0}")]
    Failed(String),

    /// I/O error while reading backing data.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Synchronous supplier of per-tile feature collections.
///
/// Implementations may block; they run on the blocking thread pool and are
/// bounded by the dispatcher's fetch timeout. They may be called concurrently
/// for different coordinates.
pub trait TileProvider: Send + Sync + 'static {
    /// Returns the features for one tile.
    fn fetch(&self, coordinate: TileCoordinate) -> Result<FeatureCollection, ProviderError>;

    /// Returns a human-readable name for logging.
    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> TileProvider for F
where
    F: Fn(TileCoordinate) -> Result<FeatureCollection, ProviderError> + Send + Sync + 'static,
{
    fn fetch(&self, coordinate: TileCoordinate) -> Result<FeatureCollection, ProviderError> {
        self(coordinate)
    }
}

/// Adapts a `(bounds, zoom)` provider function to [`TileProvider`].
pub struct BoundsProvider<F> {
    inner: F,
}

impl<F> BoundsProvider<F>
where
    F: Fn(LatLngBounds, u8) -> Result<FeatureCollection, ProviderError> + Send + Sync + 'static,
{
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

impl<F> TileProvider for BoundsProvider<F>
where
    F: Fn(LatLngBounds, u8) -> Result<FeatureCollection, ProviderError> + Send + Sync + 'static,
{
    fn fetch(&self, coordinate: TileCoordinate) -> Result<FeatureCollection, ProviderError> {
        (self.inner)(coordinate.bounds(), coordinate.zoom)
    }

    fn name(&self) -> &str {
        "bounds"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Feature, Geometry};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_closure_provider() {
        let provider = |coord: TileCoordinate| -> Result<FeatureCollection, ProviderError> {
            Ok(FeatureCollection::from(vec![Feature::new(Geometry::Point([
                coord.x as f64,
                coord.y as f64,
            ]))]))
        };

        let data = provider.fetch(TileCoordinate::new(2, 1, 3)).unwrap();
        assert_eq!(data.features[0].geometry, Geometry::Point([1.0, 3.0]));
        assert_eq!(TileProvider::name(&provider), "custom");
    }

    #[test]
    fn test_closure_provider_error() {
        let provider = |coord: TileCoordinate| -> Result<FeatureCollection, ProviderError> {
            Err(ProviderError::NoData(coord))
        };

        let err = provider.fetch(TileCoordinate::new(1, 0, 0)).unwrap_err();
        assert!(matches!(err, ProviderError::NoData(_)));
        assert!(err.to_string().contains("1/0/0"));
    }

    #[test]
    fn test_bounds_provider_receives_tile_bounds() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let provider = BoundsProvider::new(move |bounds, zoom| {
            recorder.lock().unwrap().push((bounds, zoom));
            Ok(FeatureCollection::new())
        });

        let tile = TileCoordinate::new(1, 1, 0);
        provider.fetch(tile).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, tile.bounds());
        assert_eq!(seen[0].1, 1);
        assert_eq!(provider.name(), "bounds");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ProviderError = io.into();
        assert!(err.to_string().contains("I/O error"));
    }
}
