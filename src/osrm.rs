//! Deserialization of an OSRM `route` object (`geometries=geojson&steps=true`).

use serde::Deserialize;

use crate::model::{Coordinate, RouteGeometry, Step};

#[derive(Debug, Clone, Deserialize)]
pub struct OsrmRoute {
    pub geometry: OsrmLineString,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub legs: Vec<OsrmLeg>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsrmLineString {
    pub coordinates: Vec<[f64; 2]>, // [lon, lat] standard for GeoJSON
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsrmLeg {
    pub steps: Option<Vec<OsrmStep>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsrmStep {
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub maneuver: Option<OsrmManeuver>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsrmManeuver {
    pub instruction: Option<String>,
}

impl OsrmStep {
    /// The maneuver text, else "Continue on <street>", else "Continue".
    pub fn instruction(&self) -> String {
        let maneuver = self
            .maneuver
            .as_ref()
            .and_then(|m| m.instruction.as_deref())
            .filter(|s| !s.is_empty());
        if let Some(text) = maneuver {
            return text.to_string();
        }

        match self.name.as_deref() {
            Some(name) if !name.is_empty() => format!("Continue on {name}"),
            _ => "Continue".to_string(),
        }
    }
}

impl From<OsrmRoute> for RouteGeometry {
    fn from(route: OsrmRoute) -> Self {
        let coordinates = route
            .geometry
            .coordinates
            .iter()
            .map(|&[lng, lat]| Coordinate::new(lat, lng))
            .collect();

        // Only the first leg: a two-waypoint walk has exactly one
        let steps = route.legs.first().and_then(|leg| leg.steps.as_ref()).map(|steps| {
            steps
                .iter()
                .map(|s| Step {
                    instruction: s.instruction(),
                    distance: s.distance,
                    duration: s.duration,
                })
                .collect()
        });

        RouteGeometry {
            coordinates,
            distance: route.distance,
            duration: route.duration,
            steps,
        }
    }
}
