//! Custom vector source.
//!
//! [`CustomVectorSource`] is the owner a [`TileDispatcher`] delivers into. It
//! connects an application [`TileProvider`] to a [`TileStore`]: the rendering
//! engine asks for tiles, the dispatcher fetches them in the background and
//! the results land in the store, where source queries can see them.
//!
//! The dispatcher only holds a weak reference to the source internals, so
//! dropping the source while fetches are running is safe: their results are
//! discarded.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vectorsource::executor::DispatchConfig;
//! use vectorsource::source::CustomVectorSource;
//! use vectorsource::store::MemoryTileStore;
//!
//! let store = Arc::new(MemoryTileStore::new());
//! let source = CustomVectorSource::new("roads", provider, store.clone(), DispatchConfig::default())?;
//! source.fetch_tile(14, 8192, 5461)?;
//! // ...
//! let features = source.query_source_features(None);
//! source.shutdown().await;
//! ```

mod options;

pub use options::{
    SourceOptions, DEFAULT_BUFFER, DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM, DEFAULT_TOLERANCE,
    SOURCE_SECTION,
};

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::coord::{LatLngBounds, TileCoordinate};
use crate::executor::{
    Admission, CancelOutcome, DispatchConfig, DispatchError, ResultSink, StatsSnapshot,
    TileDataSink, TileDispatcher,
};
use crate::feature::{Feature, FeatureCollection, FeatureFilter};
use crate::provider::TileProvider;
use crate::store::TileStore;

/// The part of a source the dispatcher delivers into.
struct SourceCore {
    id: String,
    options: SourceOptions,
    store: Arc<dyn TileStore>,
}

impl TileDataSink for SourceCore {
    fn install_tile_data(&self, coordinate: TileCoordinate, data: FeatureCollection) {
        self.store.install_tile_data(coordinate, data);
    }
}

/// A vector source whose tiles come from an application provider.
pub struct CustomVectorSource {
    core: Arc<SourceCore>,
    dispatcher: TileDispatcher,
}

impl CustomVectorSource {
    /// Creates a source with default options and starts its dispatcher on
    /// the current runtime.
    pub fn new<P: TileProvider>(
        id: impl Into<String>,
        provider: P,
        store: Arc<dyn TileStore>,
        config: DispatchConfig,
    ) -> Result<Self, DispatchError> {
        Self::with_options(id, provider, store, SourceOptions::default(), config)
    }

    /// Creates a source with explicit options.
    pub fn with_options<P: TileProvider>(
        id: impl Into<String>,
        provider: P,
        store: Arc<dyn TileStore>,
        options: SourceOptions,
        config: DispatchConfig,
    ) -> Result<Self, DispatchError> {
        options.validate()?;

        let core = Arc::new(SourceCore {
            id: id.into(),
            options,
            store,
        });
        let dispatcher = TileDispatcher::start(config, Arc::new(provider), ResultSink::new(&core))?;

        info!(
            source = %core.id,
            min_zoom = core.options.min_zoom,
            max_zoom = core.options.max_zoom,
            "Custom vector source created"
        );
        Ok(Self { core, dispatcher })
    }

    pub fn id(&self) -> &str {
        &self.core.id
    }

    pub fn options(&self) -> &SourceOptions {
        &self.core.options
    }

    /// Requests tile `z/x/y` from the provider.
    ///
    /// Zoom levels outside the source's range are refused without touching
    /// the queue.
    pub fn fetch_tile(&self, z: u8, x: u32, y: u32) -> Result<Admission, DispatchError> {
        let options = &self.core.options;
        if !options.accepts_zoom(z) {
            return Err(DispatchError::ZoomOutOfRange {
                zoom: z,
                min: options.min_zoom,
                max: options.max_zoom,
            });
        }
        self.dispatcher.submit(self.tile(z, x, y))
    }

    /// Cancels a pending request for tile `z/x/y`.
    pub fn cancel_tile(&self, z: u8, x: u32, y: u32) -> CancelOutcome {
        self.dispatcher.cancel(self.tile(z, x, y))
    }

    /// Installs data for one tile directly, bypassing the provider.
    pub fn set_tile_data(&self, coordinate: TileCoordinate, data: FeatureCollection) {
        self.core.install_tile_data(coordinate, data);
    }

    /// Drops the data of tile `z/x/y` and cancels any pending fetch for it.
    ///
    /// Returns true if stored data was removed.
    pub fn invalidate_tile(&self, z: u8, x: u32, y: u32) -> bool {
        let coordinate = self.tile(z, x, y);
        self.dispatcher.cancel(coordinate);
        let removed = self.core.store.invalidate_tile(coordinate);
        debug!(source = %self.core.id, tile = %coordinate, removed, "Tile invalidated");
        removed
    }

    /// Drops the data of every tile intersecting `bounds` and cancels pending
    /// fetches for them.
    ///
    /// Returns the number of stored tiles removed.
    pub fn invalidate_bounds(&self, bounds: &LatLngBounds) -> usize {
        let cancelled = self.dispatcher.cancel_matching(|c| c.covers(bounds));
        let removed = self.core.store.invalidate_region(bounds);
        debug!(
            source = %self.core.id,
            removed,
            cancelled,
            "Region invalidated"
        );
        removed
    }

    /// Returns stored features matching `filter`; empty when there are none.
    pub fn query_source_features(&self, filter: Option<&FeatureFilter>) -> Vec<Feature> {
        self.core.store.query_features(filter).unwrap_or_default()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.dispatcher.stats()
    }

    pub fn dispatcher(&self) -> &TileDispatcher {
        &self.dispatcher
    }

    fn tile(&self, z: u8, x: u32, y: u32) -> TileCoordinate {
        self.core.options.normalize(TileCoordinate::new(z, x, y))
    }

    /// Stops fetching. Pending fetches are discarded.
    pub fn close(&self) {
        self.dispatcher.close();
    }

    /// Stops fetching and waits for the dispatcher's workers to exit.
    pub async fn shutdown(self) {
        let Self { core, dispatcher } = self;
        dispatcher.shutdown().await;
        info!(source = %core.id, "Custom vector source shut down");
    }
}

impl fmt::Debug for CustomVectorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomVectorSource")
            .field("id", &self.core.id)
            .field("options", &self.core.options)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Geometry;
    use crate::provider::ProviderError;
    use crate::store::MemoryTileStore;
    use parking_lot::{Condvar, Mutex};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Tile provider that holds every call until released.
    #[derive(Default)]
    struct Gate {
        open: Mutex<bool>,
        cond: Condvar,
        running: AtomicUsize,
    }

    impl Gate {
        fn release(&self) {
            *self.open.lock() = true;
            self.cond.notify_all();
        }
    }

    fn gated_provider(
        gate: Arc<Gate>,
    ) -> impl Fn(TileCoordinate) -> Result<FeatureCollection, ProviderError> + Send + Sync + 'static {
        move |coord| {
            gate.running.fetch_add(1, Ordering::SeqCst);
            let mut open = gate.open.lock();
            while !*open {
                gate.cond.wait(&mut open);
            }
            drop(open);
            gate.running.fetch_sub(1, Ordering::SeqCst);
            tile_provider(coord)
        }
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    fn tile_provider(coord: TileCoordinate) -> Result<FeatureCollection, ProviderError> {
        Ok(FeatureCollection::from(vec![Feature::new(Geometry::Point([
            coord.x as f64,
            coord.y as f64,
        ]))
        .with_property("zoom", coord.zoom)]))
    }

    async fn settle(source: &CustomVectorSource, count: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while source.stats().settled() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("fetches did not settle");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fetched_tiles_reach_store() {
        let store = Arc::new(MemoryTileStore::new());
        let source =
            CustomVectorSource::new("test", tile_provider, store.clone(), DispatchConfig::default())
                .unwrap();
        assert_eq!(source.id(), "test");

        source.fetch_tile(1, 0, 0).unwrap();
        source.fetch_tile(1, 1, 0).unwrap();
        settle(&source, 2).await;

        assert_eq!(store.tile_count(), 2);
        assert_eq!(source.query_source_features(None).len(), 2);
        source.shutdown().await;
    }

    #[tokio::test]
    async fn test_query_without_data_is_empty() {
        let store = Arc::new(MemoryTileStore::new());
        let source =
            CustomVectorSource::new("empty", tile_provider, store, DispatchConfig::default())
                .unwrap();

        assert!(source.query_source_features(None).is_empty());
        let filter = FeatureFilter::has_property("zoom");
        assert!(source.query_source_features(Some(&filter)).is_empty());
        source.shutdown().await;
    }

    #[tokio::test]
    async fn test_set_tile_data_and_invalidate() {
        let store = Arc::new(MemoryTileStore::new());
        let source =
            CustomVectorSource::new("manual", tile_provider, store.clone(), DispatchConfig::default())
                .unwrap();

        let tile = TileCoordinate::new(3, 2, 1);
        source.set_tile_data(tile, tile_provider(tile).unwrap());
        assert!(store.contains(&tile));

        assert!(source.invalidate_tile(3, 2, 1));
        assert!(!source.invalidate_tile(3, 2, 1));
        assert!(source.query_source_features(None).is_empty());
        source.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalidate_bounds() {
        let store = Arc::new(MemoryTileStore::new());
        let source =
            CustomVectorSource::new("bounds", tile_provider, store.clone(), DispatchConfig::default())
                .unwrap();

        for x in 0..4 {
            let tile = TileCoordinate::new(2, x, 1);
            source.set_tile_data(tile, tile_provider(tile).unwrap());
        }

        // Western hemisphere strip, clear of the x=2 tile edge at 0°
        let removed = source.invalidate_bounds(&LatLngBounds::new(10.0, -10.0, -10.0, -170.0));
        assert_eq!(removed, 2);
        assert_eq!(
            store.coordinates(),
            vec![TileCoordinate::new(2, 2, 1), TileCoordinate::new(2, 3, 1)]
        );
        source.shutdown().await;
    }

    #[tokio::test]
    async fn test_close_rejects_fetches() {
        let store = Arc::new(MemoryTileStore::new());
        let source =
            CustomVectorSource::new("closed", tile_provider, store, DispatchConfig::default())
                .unwrap();

        source.close();
        assert!(matches!(source.fetch_tile(0, 0, 0), Err(DispatchError::ShutDown)));
        assert_eq!(source.cancel_tile(0, 0, 0), CancelOutcome::NotFound);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_invalidate_bounds_cancels_pending_fetches() {
        let gate = Arc::new(Gate::default());
        let store = Arc::new(MemoryTileStore::new());
        let source = CustomVectorSource::new(
            "region",
            gated_provider(Arc::clone(&gate)),
            store.clone(),
            DispatchConfig::new().with_pool_size(1),
        )
        .unwrap();

        // 2/0/1 executes, 2/1/1 and 2/3/1 wait in the queue
        source.fetch_tile(2, 0, 1).unwrap();
        wait_until(|| gate.running.load(Ordering::SeqCst) == 1).await;
        source.fetch_tile(2, 1, 1).unwrap();
        source.fetch_tile(2, 3, 1).unwrap();

        // Western hemisphere strip covers x=0 and x=1 only
        let removed = source.invalidate_bounds(&LatLngBounds::new(10.0, -10.0, -10.0, -170.0));
        assert_eq!(removed, 0);
        assert!(!source.dispatcher().is_pending(&TileCoordinate::new(2, 0, 1)));
        assert!(!source.dispatcher().is_pending(&TileCoordinate::new(2, 1, 1)));
        assert!(source.dispatcher().is_pending(&TileCoordinate::new(2, 3, 1)));

        gate.release();
        settle(&source, 3).await;

        assert_eq!(store.coordinates(), vec![TileCoordinate::new(2, 3, 1)]);
        let stats = source.stats();
        assert_eq!(stats.cancelled, 2);
        assert_eq!(stats.delivered, 1);
        source.shutdown().await;
    }

    #[tokio::test]
    async fn test_fetch_outside_zoom_range_is_refused() {
        let store = Arc::new(MemoryTileStore::new());
        let options = SourceOptions::new().with_zoom_range(2, 6);
        let source = CustomVectorSource::with_options(
            "zoomed",
            tile_provider,
            store,
            options.clone(),
            DispatchConfig::default(),
        )
        .unwrap();
        assert_eq!(source.options(), &options);

        assert!(matches!(
            source.fetch_tile(1, 0, 0),
            Err(DispatchError::ZoomOutOfRange { zoom: 1, min: 2, max: 6 })
        ));
        assert!(matches!(
            source.fetch_tile(7, 0, 0),
            Err(DispatchError::ZoomOutOfRange { zoom: 7, .. })
        ));
        assert_eq!(source.stats().accepted, 0);
        assert_eq!(source.dispatcher().live_tasks(), 0);
        source.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wrapped_requests_share_one_fetch() {
        let gate = Arc::new(Gate::default());
        let store = Arc::new(MemoryTileStore::new());
        let source = CustomVectorSource::with_options(
            "wrapped",
            gated_provider(Arc::clone(&gate)),
            store.clone(),
            SourceOptions::new().with_wrap(true),
            DispatchConfig::default(),
        )
        .unwrap();

        assert_eq!(source.fetch_tile(2, 1, 1).unwrap(), Admission::Accepted);
        assert_eq!(source.fetch_tile(2, 5, 1).unwrap(), Admission::Coalesced);

        gate.release();
        settle(&source, 1).await;
        assert_eq!(store.coordinates(), vec![TileCoordinate::new(2, 1, 1)]);
        source.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_options_rejected() {
        let store = Arc::new(MemoryTileStore::new());
        let result = CustomVectorSource::with_options(
            "inverted",
            tile_provider,
            store,
            SourceOptions::new().with_zoom_range(10, 2),
            DispatchConfig::default(),
        );
        assert!(matches!(result, Err(DispatchError::Config(_))));
    }
}
