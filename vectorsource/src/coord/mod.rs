//! Tile coordinate types.
//!
//! Provides the `TileCoordinate` key used throughout the dispatch core and
//! conversions from Web Mercator tile indices to geographic bounds.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum latitude representable in Web Mercator (degrees).
pub const MAX_LAT: f64 = 85.05112878;

/// Minimum latitude representable in Web Mercator (degrees).
pub const MIN_LAT: f64 = -85.05112878;

/// Identifies one tile in the quad-tree tiling scheme.
///
/// Coordinates are not validated: a tile outside the `2^zoom` grid is still
/// a valid key. Range checks are the caller's responsibility.
///
/// # Example
///
/// ```
/// use vectorsource::coord::TileCoordinate;
///
/// let tile = TileCoordinate::new(1, 0, 1);
/// assert_eq!(tile.zoom, 1);
/// assert_eq!(tile.to_string(), "1/0/1");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoordinate {
    /// Zoom level
    pub zoom: u8,
    /// Column (increases eastward)
    pub x: u32,
    /// Row (increases southward)
    pub y: u32,
}

impl TileCoordinate {
    /// Create a tile coordinate.
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Returns the geographic bounds covered by this tile.
    pub fn bounds(&self) -> LatLngBounds {
        LatLngBounds::from_tile(self)
    }

    /// Returns true if this tile intersects the given bounds.
    pub fn covers(&self, bounds: &LatLngBounds) -> bool {
        self.bounds().intersects(bounds)
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    /// Northern edge latitude.
    pub north: f64,
    /// Eastern edge longitude.
    pub east: f64,
    /// Southern edge latitude.
    pub south: f64,
    /// Western edge longitude. Bounds crossing the antimeridian are not
    /// supported, so `west <= east`.
    pub west: f64,
}

impl LatLngBounds {
    /// Create bounds from its four edges.
    pub fn new(north: f64, east: f64, south: f64, west: f64) -> Self {
        Self {
            north,
            east,
            south,
            west,
        }
    }

    /// Bounds covering the whole Web Mercator world.
    pub fn world() -> Self {
        Self::new(MAX_LAT, 180.0, MIN_LAT, -180.0)
    }

    /// Computes the bounds of a Web Mercator tile.
    pub fn from_tile(tile: &TileCoordinate) -> Self {
        let n = 2.0_f64.powi(tile.zoom as i32);

        let west = tile.x as f64 / n * 360.0 - 180.0;
        let east = (tile.x as f64 + 1.0) / n * 360.0 - 180.0;
        let north = row_to_lat(tile.y as f64, n);
        let south = row_to_lat(tile.y as f64 + 1.0, n);

        Self::new(north, east, south, west)
    }

    /// Returns true if the point lies inside these bounds (edges inclusive).
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.south..=self.north).contains(&lat) && (self.west..=self.east).contains(&lon)
    }

    /// Returns true if the two boxes share any area or edge.
    pub fn intersects(&self, other: &LatLngBounds) -> bool {
        self.south <= other.north
            && other.south <= self.north
            && self.west <= other.east
            && other.west <= self.east
    }

    /// Returns the center point as `(lat, lon)`.
    pub fn center(&self) -> (f64, f64) {
        ((self.north + self.south) / 2.0, (self.east + self.west) / 2.0)
    }
}

/// Inverse Web Mercator for a (possibly fractional) tile row.
fn row_to_lat(row: f64, n: f64) -> f64 {
    let lat_rad = (PI * (1.0 - 2.0 * row / n)).sinh().atan();
    lat_rad * 180.0 / PI
}
