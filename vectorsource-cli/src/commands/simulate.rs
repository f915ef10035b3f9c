//! Simulate command - drive a custom vector source with a synthetic provider.
//!
//! Tiles are requested row by row across the zoom level's grid, the way a
//! viewport sweep would. A request refused with `QueueFull` is retried after a
//! short pause, like an engine asking again on its next frame.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;
use vectorsource::executor::{Admission, DispatchConfig, DispatchError};
use vectorsource::{
    CustomVectorSource, Feature, FeatureCollection, Geometry, MemoryTileStore, ProviderError,
    SourceOptions, TileCoordinate,
};

use crate::error::CliError;

/// Pause before re-submitting a refused request.
const RETRY_DELAY: Duration = Duration::from_millis(10);

/// Arguments for the simulate command.
pub struct SimulateArgs {
    pub zoom: u8,
    pub tiles: usize,
    pub delay_ms: u64,
    pub failure_rate: u8,
    pub config: Option<PathBuf>,
    pub queue_capacity: Option<usize>,
    pub pool_size: Option<usize>,
    pub timeout_ms: Option<u64>,
}

/// Run the simulate command.
pub fn run(args: SimulateArgs) -> Result<(), CliError> {
    if args.failure_rate > 100 {
        return Err(CliError::InvalidArgument(format!(
            "failure rate must be 0-100, got {}",
            args.failure_rate
        )));
    }
    if args.zoom > 24 {
        return Err(CliError::InvalidArgument(format!(
            "zoom must be 0-24, got {}",
            args.zoom
        )));
    }

    let config = resolve_config(&args)?;
    let options = match &args.config {
        Some(path) => SourceOptions::load_from(path)?,
        None => SourceOptions::default(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    runtime.block_on(simulate(args, options, config))
}

/// CLI overrides win over the config file, which wins over defaults.
fn resolve_config(args: &SimulateArgs) -> Result<DispatchConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => DispatchConfig::load_from(path)?,
        None => DispatchConfig::default(),
    };

    if let Some(capacity) = args.queue_capacity {
        config = config.with_queue_capacity(capacity);
    }
    if let Some(size) = args.pool_size {
        config = config.with_pool_size(size);
    }
    if let Some(ms) = args.timeout_ms {
        config = config.with_fetch_timeout(Duration::from_millis(ms));
    }

    config.validate()?;
    Ok(config)
}

async fn simulate(
    args: SimulateArgs,
    options: SourceOptions,
    config: DispatchConfig,
) -> Result<(), CliError> {
    let store = Arc::new(MemoryTileStore::new());
    let provider = SyntheticProvider {
        delay: Duration::from_millis(args.delay_ms),
        failure_rate: args.failure_rate,
    };
    let source =
        CustomVectorSource::with_options("synthetic", provider, store.clone(), options, config)?;

    let tiles = sweep(args.zoom, args.tiles);
    info!(zoom = args.zoom, tiles = tiles.len(), "Starting simulation");

    let started = Instant::now();
    let mut retries = 0u64;
    for tile in &tiles {
        loop {
            match source.fetch_tile(tile.zoom, tile.x, tile.y) {
                Ok(Admission::Accepted) | Ok(Admission::Coalesced) => break,
                Err(DispatchError::QueueFull { .. }) => {
                    retries += 1;
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    while source.stats().outstanding() > 0 {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let elapsed = started.elapsed();

    let stats = source.stats();
    println!("Simulation finished in {:.2}s", elapsed.as_secs_f64());
    println!("  Tiles requested: {}", tiles.len());
    println!("  Retries:         {}", retries);
    println!("  Tiles stored:    {}", store.tile_count());
    println!("  Features:        {}", source.query_source_features(None).len());
    println!("  Stats:           {}", stats);

    source.shutdown().await;
    Ok(())
}

/// The first `count` tiles of the zoom level's grid, row by row.
fn sweep(zoom: u8, count: usize) -> Vec<TileCoordinate> {
    let side = 1u64 << zoom;
    let total = side.saturating_mul(side);
    let count = (count as u64).min(total);

    (0..count)
        .map(|i| TileCoordinate::new(zoom, (i % side) as u32, (i / side) as u32))
        .collect()
}

/// Provider generating one point per tile after a fixed delay.
///
/// Failures are a deterministic function of the coordinate, so repeated
/// runs fail the same tiles.
struct SyntheticProvider {
    delay: Duration,
    failure_rate: u8,
}

impl SyntheticProvider {
    fn should_fail(&self, tile: TileCoordinate) -> bool {
        tile_hash(tile) % 100 < u64::from(self.failure_rate)
    }
}

impl vectorsource::TileProvider for SyntheticProvider {
    fn fetch(&self, tile: TileCoordinate) -> Result<FeatureCollection, ProviderError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.should_fail(tile) {
            return Err(ProviderError::Failed(format!("synthetic failure for {}", tile)));
        }

        let (lat, lon) = tile.bounds().center();
        Ok(FeatureCollection::from(vec![Feature::new(Geometry::Point([lon, lat]))
            .with_id(tile.to_string())
            .with_property("zoom", tile.zoom)]))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

fn tile_hash(tile: TileCoordinate) -> u64 {
    (u64::from(tile.x).wrapping_mul(73_856_093))
        ^ (u64::from(tile.y).wrapping_mul(19_349_663))
        ^ (u64::from(tile.zoom).wrapping_mul(83_492_791))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vectorsource::TileProvider;

    fn args() -> SimulateArgs {
        SimulateArgs {
            zoom: 2,
            tiles: 16,
            delay_ms: 0,
            failure_rate: 0,
            config: None,
            queue_capacity: None,
            pool_size: None,
            timeout_ms: None,
        }
    }

    #[test]
    fn test_sweep_is_row_major_and_clamped() {
        let tiles = sweep(1, 10);
        assert_eq!(
            tiles,
            vec![
                TileCoordinate::new(1, 0, 0),
                TileCoordinate::new(1, 1, 0),
                TileCoordinate::new(1, 0, 1),
                TileCoordinate::new(1, 1, 1),
            ]
        );
        assert_eq!(sweep(0, 5).len(), 1);
        assert_eq!(sweep(10, 7).len(), 7);
    }

    #[test]
    fn test_failure_rate_extremes() {
        let never = SyntheticProvider {
            delay: Duration::ZERO,
            failure_rate: 0,
        };
        let always = SyntheticProvider {
            delay: Duration::ZERO,
            failure_rate: 100,
        };

        for tile in sweep(3, 64) {
            assert!(never.fetch(tile).is_ok());
            assert!(always.fetch(tile).is_err());
        }
    }

    #[test]
    fn test_failures_are_deterministic() {
        let provider = SyntheticProvider {
            delay: Duration::ZERO,
            failure_rate: 50,
        };
        let tile = TileCoordinate::new(5, 11, 17);
        assert_eq!(provider.fetch(tile).is_ok(), provider.fetch(tile).is_ok());
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("dispatch.ini");
        std::fs::write(&path, "[dispatch]\nqueue_capacity = 20\npool_size = 4\n").unwrap();

        let mut args = args();
        args.config = Some(path);
        args.pool_size = Some(2);

        let config = resolve_config(&args).unwrap();
        assert_eq!(config.queue_capacity, 20);
        assert_eq!(config.pool_size, 2);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let mut args = args();
        args.queue_capacity = Some(0);
        assert!(matches!(resolve_config(&args), Err(CliError::Config(_))));
    }

    #[test]
    fn test_run_small_simulation() {
        let mut args = args();
        args.failure_rate = 25;
        args.queue_capacity = Some(2);
        args.pool_size = Some(2);
        run(args).unwrap();
    }

    #[test]
    fn test_zoom_outside_source_range_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("dispatch.ini");
        std::fs::write(&path, "[source]\nmin_zoom = 3\nmax_zoom = 8\n").unwrap();

        let mut args = args();
        args.config = Some(path);
        assert!(matches!(
            run(args),
            Err(CliError::Dispatch(DispatchError::ZoomOutOfRange { zoom: 2, min: 3, max: 8 }))
        ));
    }
}
