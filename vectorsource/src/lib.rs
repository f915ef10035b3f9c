//! vectorsource - Asynchronous tile fetching for custom vector sources
//!
//! A rendering engine asks a custom vector source for tiles. This library
//! turns those requests into provider calls on a bounded worker pool and
//! installs the resulting feature collections into a tile store, without the
//! source's lifetime ever depending on outstanding work.
//!
//! # Modules
//!
//! - [`coord`]: tile coordinates and geographic bounds
//! - [`feature`]: GeoJSON feature model
//! - [`provider`]: the application-supplied tile data provider
//! - [`executor`]: queue, worker pool and dispatcher
//! - [`store`]: tile data storage and queries
//! - [`source`]: the custom vector source tying it all together
//! - [`logging`]: subscriber setup for binaries

pub mod coord;
pub mod executor;
pub mod feature;
pub mod logging;
pub mod provider;
pub mod source;
pub mod store;

pub use coord::{LatLngBounds, TileCoordinate};
pub use executor::{Admission, CancelOutcome, DispatchConfig, DispatchError, TileDispatcher};
pub use feature::{Feature, FeatureCollection, FeatureFilter, Geometry};
pub use provider::{BoundsProvider, ProviderError, TileProvider};
pub use source::{CustomVectorSource, SourceOptions};
pub use store::{MemoryTileStore, TileStore};
