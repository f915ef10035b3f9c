//! GeoJSON-compatible feature model.
//!
//! A [`FeatureCollection`] is the payload a provider returns for one tile and
//! the unit the store installs. All types serialize as GeoJSON.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A `[longitude, latitude]` pair.
pub type Position = [f64; 2];

/// Feature geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

/// A geometry with an optional id and a property map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub geometry: Geometry,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Feature {
    /// Creates a feature without id or properties.
    pub fn new(geometry: Geometry) -> Self {
        Self {
            id: None,
            geometry,
            properties: Map::new(),
        }
    }

    /// Sets the feature id.
    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Adds or replaces a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns a property value.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// The set of features covering one tile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }
}

impl From<Vec<Feature>> for FeatureCollection {
    fn from(features: Vec<Feature>) -> Self {
        Self { features }
    }
}

impl FromIterator<Feature> for FeatureCollection {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self {
            features: iter.into_iter().collect(),
        }
    }
}

/// Opaque predicate applied to features during a source query.
///
/// Filter evaluation belongs to the caller; the query path only applies the
/// predicate it is handed.
#[derive(Clone)]
pub struct FeatureFilter {
    predicate: Arc<dyn Fn(&Feature) -> bool + Send + Sync>,
}

impl FeatureFilter {
    /// Wraps an arbitrary predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Feature) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Matches features whose property `key` equals `value`.
    pub fn property_equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        Self::new(move |feature| feature.property(&key) == Some(&value))
    }

    /// Matches features that carry property `key`.
    pub fn has_property(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(move |feature| feature.properties.contains_key(&key))
    }

    pub fn matches(&self, feature: &Feature) -> bool {
        (self.predicate)(feature)
    }
}

impl fmt::Debug for FeatureFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureFilter").finish_non_exhaustive()
    }
}
