//! Per-source options.
//!
//! The zoom range gates which tiles are ever requested from the provider.
//! The remaining fields are geometry hints for the renderer and are carried
//! through unchanged.
//!
//! Options can be loaded from the `[source]` section of the same INI file
//! that holds the `[dispatch]` settings:
//!
//! ```ini
//! [source]
//! min_zoom = 2
//! max_zoom = 14
//! wrap = true
//! ```

use std::path::Path;

use ini::Ini;
use serde::{Deserialize, Serialize};

use crate::coord::TileCoordinate;
use crate::executor::ConfigError;

/// INI section holding source options.
pub const SOURCE_SECTION: &str = "source";

/// Lowest zoom level requested by default.
pub const DEFAULT_MIN_ZOOM: u8 = 0;

/// Highest zoom level requested by default.
pub const DEFAULT_MAX_ZOOM: u8 = 18;

/// Default tile buffer, in tile extent units.
pub const DEFAULT_BUFFER: u16 = 128;

/// Default simplification tolerance.
pub const DEFAULT_TOLERANCE: f64 = 0.375;

/// Options fixed when a source is created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceOptions {
    /// Tiles below this zoom are never fetched.
    pub min_zoom: u8,
    /// Tiles above this zoom are never fetched.
    pub max_zoom: u8,
    /// Extra margin around each tile the renderer keeps.
    pub buffer: u16,
    /// Douglas-Peucker tolerance the renderer simplifies with.
    pub tolerance: f64,
    /// Whether the renderer clips geometry to the tile plus buffer.
    pub clip: bool,
    /// Whether x coordinates outside the zoom level's grid wrap around.
    pub wrap: bool,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            buffer: DEFAULT_BUFFER,
            tolerance: DEFAULT_TOLERANCE,
            clip: false,
            wrap: false,
        }
    }
}

impl SourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_zoom_range(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub fn with_buffer(mut self, buffer: u16) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_clip(mut self, clip: bool) -> Self {
        self.clip = clip;
        self
    }

    pub fn with_wrap(mut self, wrap: bool) -> Self {
        self.wrap = wrap;
        self
    }

    /// Checks that the zoom range is ordered and the tolerance usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_zoom > self.max_zoom {
            return Err(ConfigError::invalid_value(
                SOURCE_SECTION,
                "min_zoom",
                &self.min_zoom.to_string(),
                &format!("must not exceed max_zoom ({})", self.max_zoom),
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ConfigError::invalid_value(
                SOURCE_SECTION,
                "tolerance",
                &self.tolerance.to_string(),
                "must be a non-negative number",
            ));
        }
        Ok(())
    }

    /// Returns true if tiles at `zoom` may be requested.
    pub fn accepts_zoom(&self, zoom: u8) -> bool {
        (self.min_zoom..=self.max_zoom).contains(&zoom)
    }

    /// Maps a requested coordinate to the one handed to the provider.
    ///
    /// With `wrap` set, x is reduced modulo the width of the zoom level.
    pub fn normalize(&self, coordinate: TileCoordinate) -> TileCoordinate {
        if !self.wrap || coordinate.zoom >= 32 {
            return coordinate;
        }
        let side = 1u64 << coordinate.zoom;
        let x = (u64::from(coordinate.x) % side) as u32;
        TileCoordinate::new(coordinate.zoom, x, coordinate.y)
    }

    /// Loads options from an INI file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        Self::from_ini(&ini)
    }

    /// Overlays the `[source]` section of an INI document onto defaults.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut options = Self::default();

        if let Some(section) = ini.section(Some(SOURCE_SECTION)) {
            if let Some(v) = section.get("min_zoom") {
                options.min_zoom = parse_value("min_zoom", v, "expected a zoom level")?;
            }
            if let Some(v) = section.get("max_zoom") {
                options.max_zoom = parse_value("max_zoom", v, "expected a zoom level")?;
            }
            if let Some(v) = section.get("buffer") {
                options.buffer = parse_value("buffer", v, "expected a non-negative integer")?;
            }
            if let Some(v) = section.get("tolerance") {
                options.tolerance = parse_value("tolerance", v, "expected a number")?;
            }
            if let Some(v) = section.get("clip") {
                options.clip = parse_value("clip", v, "expected true or false")?;
            }
            if let Some(v) = section.get("wrap") {
                options.wrap = parse_value("wrap", v, "expected true or false")?;
            }
        }

        options.validate()?;
        Ok(options)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str, reason: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid_value(SOURCE_SECTION, key, value, reason))
}
