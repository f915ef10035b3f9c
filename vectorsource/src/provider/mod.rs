//! Tile data provider abstraction.
//!
//! A provider is the application-supplied, synchronous source of feature
//! collections. The dispatch core calls it from a blocking worker context and
//! treats any error or panic as a dropped fetch.
//!
//! Closures of the form `Fn(TileCoordinate) -> Result<FeatureCollection, ProviderError>`
//! implement [`TileProvider`] directly. Providers written against geographic
//! bounds can be adapted with [`BoundsProvider`]:
//!
//! ```
//! use vectorsource::feature::FeatureCollection;
//! use vectorsource::provider::{BoundsProvider, TileProvider};
//! use vectorsource::coord::TileCoordinate;
//!
//! let provider = BoundsProvider::new(|_bounds, _zoom| Ok(FeatureCollection::new()));
//! assert!(provider.fetch(TileCoordinate::new(0, 0, 0)).unwrap().is_empty());
//! ```

mod types;

pub use types::{BoundsProvider, ProviderError, TileProvider};
