//! Append-only point sequence backing a live path
//!
//! Points are kept in arrival order as `[lon, lat]` pairs (GeoJSON order). The
//! only mutation is `push`; there is no way to remove, reorder or deduplicate,
//! so a track can only grow while it is live.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aircraft_report::Position;

/// Calculate the distance between two points using the Haversine formula
/// Returns distance in meters
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0; // Earth's radius in meters

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackPoints(Vec<[f64; 2]>);

impl TrackPoints {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Start a sequence with a single point
    pub fn starting_at(position: Position) -> Self {
        let mut points = Self::new();
        points.push(position);
        points
    }

    /// Append a point to the end of the sequence
    pub fn push(&mut self, position: Position) {
        self.0.push([position.longitude, position.latitude]);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Points in arrival order as `[lon, lat]`
    pub fn coordinates(&self) -> &[[f64; 2]] {
        &self.0
    }

    /// Polyline length in kilometers; zero for fewer than two points
    pub fn length_km(&self) -> f64 {
        self.0
            .windows(2)
            .map(|pair| {
                let [lon1, lat1] = pair[0];
                let [lon2, lat2] = pair[1];
                haversine_distance(lat1, lon1, lat2, lon2)
            })
            .sum::<f64>()
            / 1000.0
    }

    pub fn to_json(&self) -> Value {
        Value::Array(
            self.0
                .iter()
                .map(|[lon, lat]| serde_json::json!([lon, lat]))
                .collect(),
        )
    }

    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value(value).context("Invalid track point list")
    }
}
