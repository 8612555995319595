use std::f64::consts::FRAC_PI_2;

use rstar::{AABB, RTree};

use crate::distance::{EARTH_RADIUS_LOWER_BOUND_METERS, distance};
use crate::model::{Coordinate, IncidentPoint};

const MIN_INTENSITY: u32 = 12;
const MAX_INTENSITY: u32 = 40;

// Widens the search box a hair past the analytic bound to absorb rounding.
const ENVELOPE_PAD: f64 = 1.0 + 1e-9;

/// True if any route vertex lies within `threshold_meters` of `point`.
///
/// Stops at the first vertex inside the threshold. NaN distances never count.
pub fn is_near_route(point: Coordinate, route: &[Coordinate], threshold_meters: f64) -> bool {
    route
        .iter()
        .any(|&vertex| distance(point, vertex) <= threshold_meters)
}

/// Number of incidents whose nearest route vertex is within `threshold_meters`.
pub fn count_nearby(
    route: &[Coordinate],
    incidents: &[IncidentPoint],
    threshold_meters: f64,
) -> usize {
    if incidents.is_empty() {
        return 0;
    }

    incidents
        .iter()
        .filter(|incident| is_near_route(incident.coordinate, route, threshold_meters))
        .count()
}

/// The incidents [`count_nearby`] would count, in input order.
pub fn nearby_incidents<'a>(
    route: &[Coordinate],
    incidents: &'a [IncidentPoint],
    threshold_meters: f64,
) -> Vec<&'a IncidentPoint> {
    incidents
        .iter()
        .filter(|incident| is_near_route(incident.coordinate, route, threshold_meters))
        .collect()
}

/// Heat-layer radius for a given nearby count, `12 + 2n` clamped to `[12, 40]`.
pub fn heat_intensity(count: usize) -> u32 {
    let count = u32::try_from(count).unwrap_or(u32::MAX);
    MIN_INTENSITY
        .saturating_add(count.saturating_mul(2))
        .clamp(MIN_INTENSITY, MAX_INTENSITY)
}

/// R-tree over a route's vertices.
///
/// Answers the same question as [`is_near_route`] for long routes and large
/// incident sets. Each lookup scans a lat/lng box that provably contains every
/// vertex within the threshold, then confirms candidates with the exact
/// haversine distance, so inclusion decisions match the linear scan exactly.
pub struct ProximityIndex<'a> {
    route: &'a [Coordinate],
    // `None` when some vertex is outside the valid lat/lng range; the box
    // bounds assume every vertex sits on the sphere.
    tree: Option<RTree<[f64; 2]>>,
}

impl<'a> ProximityIndex<'a> {
    pub fn new(route: &'a [Coordinate]) -> Self {
        let finite = route.iter().filter(|c| c.lat.is_finite() && c.lng.is_finite());

        let tree = if finite.clone().all(Coordinate::is_valid) {
            Some(RTree::bulk_load(finite.map(|c| c.to_lng_lat()).collect()))
        } else {
            None
        };

        Self { route, tree }
    }

    pub fn is_near(&self, point: Coordinate, threshold_meters: f64) -> bool {
        let Some(tree) = &self.tree else {
            return is_near_route(point, self.route, threshold_meters);
        };
        let Some(envelope) = search_envelope(point, threshold_meters) else {
            return is_near_route(point, self.route, threshold_meters);
        };

        tree.locate_in_envelope(&envelope)
            .any(|&[lng, lat]| distance(point, Coordinate::new(lat, lng)) <= threshold_meters)
    }

    pub fn count_nearby(&self, incidents: &[IncidentPoint], threshold_meters: f64) -> usize {
        if incidents.is_empty() {
            return 0;
        }

        incidents
            .iter()
            .filter(|incident| self.is_near(incident.coordinate, threshold_meters))
            .count()
    }

    pub fn nearby_incidents<'b>(
        &self,
        incidents: &'b [IncidentPoint],
        threshold_meters: f64,
    ) -> Vec<&'b IncidentPoint> {
        incidents
            .iter()
            .filter(|incident| self.is_near(incident.coordinate, threshold_meters))
            .collect()
    }
}

/// Lat/lng box around `center` holding every point within `threshold_meters`.
///
/// Haversine gives `d >= R * |dlat|` and, with `c` the smallest latitude
/// cosine in the band, `sin(|dlng| / 2) <= sin(d / 2R) / c`. Returns `None`
/// when the box would touch a pole or cross the antimeridian.
fn search_envelope(center: Coordinate, threshold_meters: f64) -> Option<AABB<[f64; 2]>> {
    if !center.is_valid() {
        return None;
    }

    let angle = threshold_meters / EARTH_RADIUS_LOWER_BOUND_METERS;
    if !(0.0..FRAC_PI_2).contains(&angle) {
        return None;
    }

    let dlat = (angle * ENVELOPE_PAD).to_degrees();
    let max_abs_lat = center.lat.abs() + dlat;
    if max_abs_lat >= 90.0 {
        return None;
    }

    let ratio = (angle / 2.0).sin() / max_abs_lat.to_radians().cos();
    if ratio >= 1.0 {
        return None;
    }

    let dlng = (2.0 * ratio.asin() * ENVELOPE_PAD).to_degrees();
    let (min_lng, max_lng) = (center.lng - dlng, center.lng + dlng);
    if min_lng < -180.0 || max_lng > 180.0 {
        return None;
    }

    Some(AABB::from_corners(
        [min_lng, center.lat - dlat],
        [max_lng, center.lat + dlat],
    ))
}
