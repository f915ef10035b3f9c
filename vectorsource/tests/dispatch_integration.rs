//! Integration tests for the custom vector source.
//!
//! These tests drive the complete flow:
//! - fetch request → dispatcher → provider → store
//! - admission limits under bursts
//! - invalidation and teardown racing with running fetches
//!
//! Run with: `cargo test --test dispatch_integration`

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vectorsource::executor::{Admission, DispatchConfig, DispatchError};
use vectorsource::{
    BoundsProvider, CustomVectorSource, Feature, FeatureCollection, FeatureFilter, Geometry,
    LatLngBounds, MemoryTileStore, ProviderError, TileCoordinate, TileStore,
};

// ============================================================================
// Helper Functions
// ============================================================================

/// One point per tile at the tile's center, tagged with its coordinate.
fn center_point(coord: TileCoordinate) -> Result<FeatureCollection, ProviderError> {
    let (lat, lon) = coord.bounds().center();
    Ok(FeatureCollection::from(vec![Feature::new(Geometry::Point([lon, lat]))
        .with_property("tile", coord.to_string())]))
}

/// Provider that sleeps before answering.
fn slow_provider(
    delay: Duration,
) -> impl Fn(TileCoordinate) -> Result<FeatureCollection, ProviderError> + Send + Sync + 'static {
    move |coord| {
        std::thread::sleep(delay);
        center_point(coord)
    }
}

/// Store whose installs take a while, flagging when one has begun.
struct SlowInstallStore {
    inner: MemoryTileStore,
    install_started: AtomicBool,
    delay: Duration,
}

impl SlowInstallStore {
    fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryTileStore::new(),
            install_started: AtomicBool::new(false),
            delay,
        }
    }
}

impl TileStore for SlowInstallStore {
    fn install_tile_data(&self, coordinate: TileCoordinate, data: FeatureCollection) {
        self.install_started.store(true, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.inner.install_tile_data(coordinate, data);
    }

    fn invalidate_tile(&self, coordinate: TileCoordinate) -> bool {
        self.inner.invalidate_tile(coordinate)
    }

    fn invalidate_region(&self, bounds: &LatLngBounds) -> usize {
        self.inner.invalidate_region(bounds)
    }

    fn query_features(&self, filter: Option<&FeatureFilter>) -> Option<Vec<Feature>> {
        self.inner.query_features(filter)
    }
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ============================================================================
// Integration Tests
// ============================================================================

/// Three tiles submitted with default limits are each delivered exactly once
/// with the provider's collection for that tile.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_tiles_delivered_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let provider = move |coord: TileCoordinate| -> Result<FeatureCollection, ProviderError> {
        counter.fetch_add(1, Ordering::SeqCst);
        center_point(coord)
    };

    let store = Arc::new(MemoryTileStore::new());
    let source =
        CustomVectorSource::new("three", provider, store.clone(), DispatchConfig::default())
            .unwrap();

    let tiles = [
        TileCoordinate::new(1, 0, 0),
        TileCoordinate::new(1, 1, 0),
        TileCoordinate::new(1, 0, 1),
    ];
    for tile in tiles {
        assert_eq!(
            source.fetch_tile(tile.zoom, tile.x, tile.y).unwrap(),
            Admission::Accepted
        );
    }

    wait_for(|| source.stats().delivered == 3).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(store.tile_count(), 3);

    for tile in tiles {
        let data = store.tile(&tile).unwrap();
        assert_eq!(*data, center_point(tile).unwrap());
    }

    let filter = FeatureFilter::property_equals("tile", "1/1/0");
    assert_eq!(source.query_source_features(Some(&filter)).len(), 1);

    source.shutdown().await;
}

/// A burst larger than the queue is partly rejected, never blocks, and every
/// admitted fetch still completes.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_burst_beyond_capacity() {
    let store = Arc::new(MemoryTileStore::new());
    let config = DispatchConfig::new()
        .with_queue_capacity(4)
        .with_pool_size(2);
    let source = CustomVectorSource::new(
        "burst",
        slow_provider(Duration::from_millis(50)),
        store.clone(),
        config,
    )
    .unwrap();

    let mut accepted = 0;
    let mut rejected = 0;
    for x in 0..20 {
        match source.fetch_tile(10, x, 0) {
            Ok(Admission::Accepted) => accepted += 1,
            Err(DispatchError::QueueFull { capacity }) => {
                assert_eq!(capacity, 4);
                rejected += 1;
            }
            other => panic!("unexpected admission result: {other:?}"),
        }
    }

    assert_eq!(accepted + rejected, 20);
    assert!(accepted >= 4, "queue should admit at least its capacity");
    assert!(accepted <= 6, "admitted more than queue plus workers");

    wait_for(|| source.stats().delivered == accepted as u64).await;
    assert!(source.stats().peak_active <= 2);
    assert_eq!(store.tile_count(), accepted);

    source.shutdown().await;
}

/// Invalidating a tile while its fetch runs keeps the stale result out of
/// the store.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalidate_during_fetch_discards_result() {
    let store = Arc::new(MemoryTileStore::new());
    let source = CustomVectorSource::new(
        "stale",
        slow_provider(Duration::from_millis(200)),
        store.clone(),
        DispatchConfig::default(),
    )
    .unwrap();

    source.fetch_tile(5, 3, 7).unwrap();
    wait_for(|| source.stats().active == 1).await;

    source.invalidate_tile(5, 3, 7);
    wait_for(|| source.stats().cancelled == 1).await;

    // Let the abandoned provider call finish
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(store.tile_count(), 0);
    assert_eq!(source.stats().delivered, 0);

    // A fresh request for the same tile goes through
    assert_eq!(source.fetch_tile(5, 3, 7).unwrap(), Admission::Accepted);
    wait_for(|| source.stats().delivered == 1).await;
    assert!(store.contains(&TileCoordinate::new(5, 3, 7)));

    source.shutdown().await;
}

/// Invalidating a tile whose data is being installed waits for the install
/// and then removes it, so nothing stale survives the call.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_invalidate_during_install_leaves_no_data() {
    let store = Arc::new(SlowInstallStore::new(Duration::from_millis(200)));
    let source =
        CustomVectorSource::new("installing", center_point, store.clone(), DispatchConfig::default())
            .unwrap();

    source.fetch_tile(4, 2, 2).unwrap();
    wait_for(|| store.install_started.load(Ordering::SeqCst)).await;

    assert!(source.invalidate_tile(4, 2, 2));
    assert!(!store.inner.contains(&TileCoordinate::new(4, 2, 2)));

    wait_for(|| source.stats().settled() == 1).await;
    assert_eq!(store.inner.tile_count(), 0);
    assert!(source.query_source_features(None).is_empty());

    source.shutdown().await;
}

/// Dropping the source with fetches outstanding is harmless.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_drop_source_with_outstanding_fetches() {
    let store = Arc::new(MemoryTileStore::new());
    let source = CustomVectorSource::new(
        "dropped",
        slow_provider(Duration::from_millis(100)),
        store.clone(),
        DispatchConfig::new().with_pool_size(2),
    )
    .unwrap();

    for x in 0..8 {
        source.fetch_tile(6, x, 0).unwrap();
    }
    wait_for(|| source.stats().active == 2).await;
    drop(source);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(store.tile_count(), 0);
}

/// Bounds-based providers see the geographic extent of each tile.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bounds_provider() {
    let provider = BoundsProvider::new(
        |bounds: LatLngBounds, zoom: u8| -> Result<FeatureCollection, ProviderError> {
            if zoom > 2 {
                return Err(ProviderError::Failed("zoom not supported".into()));
            }
            Ok(FeatureCollection::from(vec![Feature::new(Geometry::Polygon(vec![vec![
                [bounds.west, bounds.south],
                [bounds.east, bounds.south],
                [bounds.east, bounds.north],
                [bounds.west, bounds.north],
                [bounds.west, bounds.south],
            ]]))]))
        },
    );

    let store = Arc::new(MemoryTileStore::new());
    let source =
        CustomVectorSource::new("bounds", provider, store.clone(), DispatchConfig::default())
            .unwrap();

    source.fetch_tile(0, 0, 0).unwrap();
    source.fetch_tile(3, 0, 0).unwrap();
    wait_for(|| source.stats().settled() == 2).await;

    let stats = source.stats();
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.failed, 1);

    let world = store.tile(&TileCoordinate::new(0, 0, 0)).unwrap();
    match &world.features[0].geometry {
        Geometry::Polygon(rings) => {
            let [lon, lat] = rings[0][0];
            assert_eq!(lon, -180.0);
            assert!((lat - LatLngBounds::world().south).abs() < 1e-6);
        }
        other => panic!("unexpected geometry: {other:?}"),
    }

    source.shutdown().await;
}

/// Configuration loaded from disk drives the dispatcher limits.
#[tokio::test]
async fn test_source_from_config_file() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("dispatch.ini");
    std::fs::write(
        &path,
        "[dispatch]\nqueue_capacity = 12\npool_size = 3\nfetch_timeout_secs = 5\n",
    )
    .unwrap();

    let config = DispatchConfig::load_from(&path).unwrap();
    let store = Arc::new(MemoryTileStore::new());
    let source = CustomVectorSource::new("configured", center_point, store, config).unwrap();

    let config = source.dispatcher().config();
    assert_eq!(config.queue_capacity, 12);
    assert_eq!(config.pool_size, 3);
    assert_eq!(config.fetch_timeout, Duration::from_secs(5));

    source.shutdown().await;
}
