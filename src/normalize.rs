//! Turns heterogeneous open-data records into [`IncidentPoint`]s.
//!
//! Portals disagree on where a record's position lives: a nested `location`
//! object (`GeoJSON` point or Socrata-style lat/lng), flat `lat`/`lng` style
//! columns, or a `"(lat, lng)"` text column. Each shape is a
//! [`LocationStrategy`]; strategies run in priority order and the first one
//! yielding an acceptable pair wins.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{Coordinate, IncidentPoint};

lazy_static! {
    static ref POINT_TEXT: Regex =
        Regex::new(r"\(?\s*([\d.-]+)\s*,\s*([\d.-]+)\s*\)?").unwrap();
    static ref LEADING_NUMBER: Regex =
        Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?").unwrap();
}

const LATITUDE_ALIASES: &[&str] = &["latitude", "lat"];
const LONGITUDE_ALIASES: &[&str] = &["longitude", "lon", "lng"];

/// Whether a `0` latitude or longitude is a real position.
///
/// Many portals write `0` for "no position", so the default rejects it. That
/// also drops genuine equatorial and prime-meridian incidents; `Accept` keeps
/// them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroCoordinatePolicy {
    #[default]
    Reject,
    Accept,
}

impl ZeroCoordinatePolicy {
    fn accepts(self, c: Coordinate) -> bool {
        if !c.is_valid() {
            return false;
        }
        match self {
            ZeroCoordinatePolicy::Reject => c.lat != 0.0 && c.lng != 0.0,
            ZeroCoordinatePolicy::Accept => true,
        }
    }

    /// Whether a raw field counts as present. Numeric `0` is missing under
    /// `Reject`, so the next alias or strategy gets a chance.
    fn has_value(self, value: &Value) -> bool {
        match self {
            ZeroCoordinatePolicy::Reject => is_truthy(value),
            ZeroCoordinatePolicy::Accept => {
                is_truthy(value) || value.as_f64().is_some_and(|f| f == 0.0)
            }
        }
    }
}

/// One way a record can carry its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationStrategy {
    /// `location: {coordinates: [lng, lat]}` or `location: {latitude, longitude}`.
    NestedLocation,
    /// `latitude`/`lat` and `longitude`/`lon`/`lng` columns.
    TopLevelFields,
    /// `point: "(lat, lng)"`.
    PointText,
}

impl LocationStrategy {
    pub const PRIORITY: [LocationStrategy; 3] = [
        LocationStrategy::NestedLocation,
        LocationStrategy::TopLevelFields,
        LocationStrategy::PointText,
    ];

    pub fn extract(self, record: &Value, policy: ZeroCoordinatePolicy) -> Option<Coordinate> {
        match self {
            LocationStrategy::NestedLocation => {
                let location = record.get("location")?.as_object()?;
                // GeoJSON Point: {"type":"Point","coordinates":[lng, lat]}
                if let Some(coords) = location.get("coordinates").and_then(Value::as_array) {
                    let lng = parse_number(coords.first()?)?;
                    let lat = parse_number(coords.get(1)?)?;
                    return Some(Coordinate::new(lat, lng));
                }
                // Socrata location: {"latitude":"32.71","longitude":"-96.88"}
                let lat = location.get("latitude").filter(|v| policy.has_value(v))?;
                let lng = location.get("longitude").filter(|v| policy.has_value(v))?;
                Some(Coordinate::new(parse_number(lat)?, parse_number(lng)?))
            }
            LocationStrategy::TopLevelFields => {
                let lat = first_present(record, LATITUDE_ALIASES, policy)?;
                let lng = first_present(record, LONGITUDE_ALIASES, policy)?;
                Some(Coordinate::new(parse_number(lat)?, parse_number(lng)?))
            }
            LocationStrategy::PointText => {
                let text = record.get("point")?.as_str()?;
                let captures = POINT_TEXT.captures(text)?;
                let lat = parse_leading_number(captures.get(1)?.as_str())?;
                let lng = parse_leading_number(captures.get(2)?.as_str())?;
                Some(Coordinate::new(lat, lng))
            }
        }
    }
}

/// Output of a normalization pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub incidents: Vec<IncidentPoint>,
    /// Records with no acceptable position.
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    policy: ZeroCoordinatePolicy,
}

impl Normalizer {
    pub fn new(policy: ZeroCoordinatePolicy) -> Self {
        Self { policy }
    }

    /// Position of a single record, if any strategy finds an acceptable one.
    pub fn locate(&self, record: &Value) -> Option<Coordinate> {
        LocationStrategy::PRIORITY
            .iter()
            .filter_map(|strategy| strategy.extract(record, self.policy))
            .find(|&c| self.policy.accepts(c))
    }

    pub fn normalize(&self, records: &[Value]) -> Normalized {
        let mut out = Normalized::default();

        for record in records {
            let located = record
                .as_object()
                .and_then(|attributes| Some((self.locate(record)?, attributes)));

            match located {
                Some((coordinate, attributes)) => out
                    .incidents
                    .push(IncidentPoint::new(coordinate, attributes.clone())),
                None => out.dropped += 1,
            }
        }

        out
    }
}

/// Normalizes with the default [`ZeroCoordinatePolicy::Reject`].
pub fn normalize(records: &[Value]) -> Normalized {
    Normalizer::default().normalize(records)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn first_present<'a>(
    record: &'a Value,
    aliases: &[&str],
    policy: ZeroCoordinatePolicy,
) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|key| record.get(*key))
        .find(|v| policy.has_value(v))
}

/// JSON numbers as-is; strings by their leading numeric prefix.
fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_leading_number(s),
        _ => None,
    }
}

fn parse_leading_number(text: &str) -> Option<f64> {
    LEADING_NUMBER
        .find(text.trim_start())
        .and_then(|m| m.as_str().parse().ok())
}
