use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use geojson::GeoJson;
use serde_json::{Map, Value};

use crate::model::{Coordinate, IncidentPoint};
use crate::normalize::{Normalizer, ZeroCoordinatePolicy};

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to read incident file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),
}

/// One loaded batch of incidents. Replaced as a whole, never merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncidentSet {
    pub incidents: Vec<IncidentPoint>,
    /// Where the batch came from (file path, upload kind).
    pub source: String,
    /// Input entries that produced no incident.
    pub dropped: usize,
}

impl IncidentSet {
    pub fn empty(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }

    /// Point features of a `FeatureCollection`. Other geometries are skipped;
    /// a document that is not a collection yields an empty set.
    pub fn from_geojson_str(text: &str, source: impl Into<String>) -> Result<Self, DatasetError> {
        let geojson: GeoJson = text.parse()?;
        Ok(Self::from_geojson(geojson, source))
    }

    pub fn from_geojson(geojson: GeoJson, source: impl Into<String>) -> Self {
        let mut set = Self::empty(source);

        let GeoJson::FeatureCollection(collection) = geojson else {
            return set;
        };

        for feature in collection.features {
            let point = match feature.geometry.as_ref().map(|g| &g.value) {
                // GeoJSON is [lng, lat]
                Some(geojson::Value::Point(position)) if position.len() >= 2 => {
                    Coordinate::new(position[1], position[0])
                }
                _ => {
                    set.dropped += 1;
                    continue;
                }
            };
            if !point.is_valid() {
                set.dropped += 1;
                continue;
            }

            let attributes = feature.properties.unwrap_or_else(Map::new);
            set.incidents.push(IncidentPoint::new(point, attributes));
        }

        set
    }

    /// Raw open-data records, located by the [`Normalizer`].
    pub fn from_records(
        records: &[Value],
        policy: ZeroCoordinatePolicy,
        source: impl Into<String>,
    ) -> Self {
        let normalized = Normalizer::new(policy).normalize(records);
        Self {
            incidents: normalized.incidents,
            source: source.into(),
            dropped: normalized.dropped,
        }
    }

    /// A top-level JSON array is read as raw records, anything else as GeoJSON.
    pub fn from_json_str(
        text: &str,
        policy: ZeroCoordinatePolicy,
        source: impl Into<String>,
    ) -> Result<Self, DatasetError> {
        match serde_json::from_str::<Value>(text)? {
            Value::Array(records) => Ok(Self::from_records(&records, policy, source)),
            other => Ok(Self::from_geojson(GeoJson::from_json_value(other)?, source)),
        }
    }

    pub fn load_file(path: &Path, policy: ZeroCoordinatePolicy) -> Result<Self, DatasetError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text, policy, path.display().to_string())
    }
}

/// Holds the current [`IncidentSet`].
///
/// Readers take an `Arc` snapshot and keep it for the whole computation, so a
/// concurrent [`IncidentStore::replace`] is either fully visible or not at all.
#[derive(Debug, Default)]
pub struct IncidentStore {
    current: RwLock<Arc<IncidentSet>>,
}

impl IncidentStore {
    pub fn new(set: IncidentSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(set)),
        }
    }

    pub fn snapshot(&self) -> Arc<IncidentSet> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Swaps in `set`, returning the previous one.
    pub fn replace(&self, set: IncidentSet) -> Arc<IncidentSet> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(set))
    }
}
