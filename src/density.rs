use h3o::{CellIndex, LatLng, Resolution};
use itertools::Itertools;
use serde::Serialize;
use std::collections::HashMap;

use crate::model::IncidentPoint;

/// Incident counts bucketed into H3 hexagons, for the heat overlay.
pub struct IncidentDensity {
    resolution: Resolution,
    cells: HashMap<CellIndex, usize>,
}

/// One hexagon of the overlay, positioned at its centre.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DensityCell {
    pub cell: String,
    pub lat: f64,
    pub lng: f64,
    pub count: usize,
}

impl IncidentDensity {
    pub fn from_incidents(incidents: &[IncidentPoint], resolution: Resolution) -> Self {
        let mut cells = HashMap::new();

        for incident in incidents {
            if !incident.coordinate.is_valid() {
                continue;
            }
            let Ok(ll) = LatLng::new(incident.coordinate.lat, incident.coordinate.lng) else {
                continue;
            };
            *cells.entry(ll.to_cell(resolution)).or_insert(0) += 1;
        }

        Self { resolution, cells }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn total(&self) -> usize {
        self.cells.values().sum()
    }

    /// Densest cells first; ties broken by cell id.
    pub fn cells(&self) -> Vec<DensityCell> {
        self.cells
            .iter()
            .map(|(&cell, &count)| {
                let centre = LatLng::from(cell);
                DensityCell {
                    cell: cell.to_string(),
                    lat: centre.lat(),
                    lng: centre.lng(),
                    count,
                }
            })
            .sorted_by(|a, b| b.count.cmp(&a.count).then_with(|| a.cell.cmp(&b.cell)))
            .collect()
    }
}
