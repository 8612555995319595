use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and inside the lat/lng ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// GeoJSON order: `[lng, lat]`.
    pub fn to_lng_lat(self) -> [f64; 2] {
        [self.lng, self.lat]
    }
}

/// A geo-located crime record. `attributes` keeps every field of the source record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentPoint {
    #[serde(flatten)]
    pub coordinate: Coordinate,
    pub attributes: Map<String, Value>,
}

impl IncidentPoint {
    pub fn new(coordinate: Coordinate, attributes: Map<String, Value>) -> Self {
        Self {
            coordinate,
            attributes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub instruction: String,
    pub distance: f64,
    pub duration: f64,
}

/// A routed walking path, ordered start to end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteGeometry {
    pub coordinates: Vec<Coordinate>,
    /// meters
    pub distance: f64,
    /// seconds
    pub duration: f64,
    /// `None` when the router gave no turn-by-turn data.
    pub steps: Option<Vec<Step>>,
}

impl RouteGeometry {
    /// Number of turn instructions, or the vertex count when steps are unavailable.
    pub fn step_count(&self) -> usize {
        match &self.steps {
            Some(steps) => steps.len(),
            None => self.coordinates.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    pub base_score: u8,
    pub crime_penalty: u8,
    pub crimes_near: usize,
}
