//! Route safety scoring.
//!
//! A route starts at [`STARTING_SCORE`] and loses points for trip attributes
//! (night walking, length, duration, complexity), then a capped penalty for
//! crime incidents near its path. Scores are integers in `0..=10`.

use chrono::{DateTime, TimeZone, Timelike};
use serde::Serialize;

use crate::model::{IncidentPoint, RouteGeometry, ScoreBreakdown};
use crate::proximity::{ProximityIndex, heat_intensity};

pub const MAX_SCORE: u8 = 10;
pub const STARTING_SCORE: u8 = 8;
pub const MAX_CRIME_PENALTY: u8 = 4;

const METERS_PER_MILE: f64 = 1609.34;
const LONG_WALK_MINUTES: f64 = 20.0;
const COMPLEX_ROUTE_STEPS: usize = 30;
/// Night is `[NIGHT_START_HOUR, 24) ∪ [0, NIGHT_END_HOUR)`.
const NIGHT_START_HOUR: u32 = 20;
const NIGHT_END_HOUR: u32 = 6;

const NIGHT_DEDUCTION: u8 = 2;

/// Display band for a final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyBand {
    Good, // >= 8
    Warn, // 5-7
    Bad,  // < 5
}

impl SafetyBand {
    pub fn from_score(score: u8) -> Self {
        if score >= 8 {
            SafetyBand::Good
        } else if score >= 5 {
            SafetyBand::Warn
        } else {
            SafetyBand::Bad
        }
    }}

/// Full result of scoring one route against one incident set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteAssessment {
    pub score: u8,
    pub band: SafetyBand,
    pub breakdown: ScoreBreakdown,
    /// Heat-layer radius hint for the presentation layer.
    pub intensity: u32,
}

pub fn is_night(hour: u32) -> bool {
    hour >= NIGHT_START_HOUR || hour < NIGHT_END_HOUR
}

/// Score from trip attributes alone, using the local hour of `now`.
pub fn base_score<Tz: TimeZone>(route: &RouteGeometry, now: &DateTime<Tz>) -> u8 {
    let mut deductions: u8 = 0;

    if is_night(now.hour()) {
        deductions += NIGHT_DEDUCTION;
    }
    if route.distance / METERS_PER_MILE > 1.0 {
        deductions += 1;
    }
    // whole minutes, as shown to the walker
    if (route.duration / 60.0).round() > LONG_WALK_MINUTES {
        deductions += 1;
    }
    if route.step_count() > COMPLEX_ROUTE_STEPS {
        deductions += 1;
    }

    STARTING_SCORE.saturating_sub(deductions).min(MAX_SCORE)
}

/// `min(4, ceil(n / 2))`
pub fn crime_penalty(crimes_near: usize) -> u8 {
    let penalty = crimes_near.div_ceil(2).min(usize::from(MAX_CRIME_PENALTY));
    u8::try_from(penalty).unwrap_or(MAX_CRIME_PENALTY)
}

/// Applies the crime penalty to a base score. Returns `(score, penalty)`.
pub fn final_score(base: u8, crimes_near: usize) -> (u8, u8) {
    let penalty = crime_penalty(crimes_near);
    let score = base.min(MAX_SCORE).saturating_sub(penalty);
    (score, penalty)
}

/// Scores `route` against `incidents`.
pub fn assess_route<Tz: TimeZone>(
    route: &RouteGeometry,
    incidents: &[IncidentPoint],
    threshold_meters: f64,
    now: &DateTime<Tz>,
) -> RouteAssessment {
    let base = base_score(route, now);
    let index = ProximityIndex::new(&route.coordinates);
    let crimes_near = index.count_nearby(incidents, threshold_meters);
    let (score, penalty) = final_score(base, crimes_near);

    RouteAssessment {
        score,
        band: SafetyBand::from_score(score),
        breakdown: ScoreBreakdown {
            base_score: base,
            crime_penalty: penalty,
            crimes_near,
        },
        intensity: heat_intensity(crimes_near),
    }
}
