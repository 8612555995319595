use geo::Point;
use geo::prelude::*;

use crate::model::Coordinate;

/// Lower bound on the sphere radius `geo` uses for haversine (6371008.8 m).
/// Envelope maths in the proximity index divides by this, so a smaller value
/// only widens the search box.
pub const EARTH_RADIUS_LOWER_BOUND_METERS: f64 = 6_371_000.0;

/// Great-circle distance in meters. NaN in, NaN out.
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    let p1 = Point::new(a.lng, a.lat);
    let p2 = Point::new(b.lng, b.lat);
    p1.haversine_distance(&p2)
}
