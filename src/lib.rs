//! Walking-route safety scoring against crime-incident data.
//!
//! The core (`distance`, `proximity`, `scoring`, `normalize`) is pure and
//! synchronous. `dataset`, `density`, `osrm` and `api` wrap it in an HTTP
//! service that owns the current incident set.

pub mod api;
pub mod config;
pub mod dataset;
pub mod density;
pub mod distance;
pub mod model;
pub mod normalize;
pub mod osrm;
pub mod proximity;
pub mod scoring;

pub use model::{Coordinate, IncidentPoint, RouteGeometry, ScoreBreakdown, Step};
pub use normalize::{Normalizer, ZeroCoordinatePolicy, normalize};
pub use proximity::{ProximityIndex, count_nearby, heat_intensity, nearby_incidents};
pub use scoring::{RouteAssessment, SafetyBand, assess_route, base_score, final_score};
