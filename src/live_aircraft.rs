use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aircraft_report::{AircraftReport, BaroAltitude, Position};

/// Most recent known state of one aircraft, keyed by hex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveAircraftState {
    pub hex: String,
    pub flight: Option<String>,
    pub category: Option<String>,
    /// `ingest time - seen`
    pub last_seen: DateTime<Utc>,
    pub position: Option<Position>,
    pub alt_baro: Option<BaroAltitude>,
    pub track: Option<f64>,
    pub payload: Value,
}

impl LiveAircraftState {
    /// Build the full replacement row for a report
    pub fn from_report(report: &AircraftReport, now: DateTime<Utc>) -> Self {
        Self {
            hex: report.hex.clone(),
            flight: report.flight.clone(),
            category: report.category.clone(),
            last_seen: report.last_seen_at(now),
            position: report.position,
            alt_baro: report.alt_baro,
            track: report.track,
            payload: report.payload.clone(),
        }
    }
}

/// Diesel model for aircraft_live; every column is overwritten on upsert
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::aircraft_live)]
#[diesel(primary_key(hex))]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LiveAircraftModel {
    pub hex: String,
    pub flight: Option<String>,
    pub category: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub alt_baro_ft: Option<i32>,
    pub on_ground: bool,
    pub track_degrees: Option<f64>,
    pub payload: Value,
    pub updated_at: DateTime<Utc>,
}

impl From<&LiveAircraftState> for LiveAircraftModel {
    fn from(state: &LiveAircraftState) -> Self {
        Self {
            hex: state.hex.clone(),
            flight: state.flight.clone(),
            category: state.category.clone(),
            last_seen: state.last_seen,
            latitude: state.position.map(|p| p.latitude),
            longitude: state.position.map(|p| p.longitude),
            alt_baro_ft: state.alt_baro.and_then(|a| a.feet()),
            on_ground: state.alt_baro.is_some_and(|a| a.is_ground()),
            track_degrees: state.track,
            payload: state.payload.clone(),
            updated_at: Utc::now(),
        }
    }
}

/// Row read back from aircraft_live
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::aircraft_live)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LiveAircraftRow {
    pub hex: String,
    pub flight: Option<String>,
    pub category: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub alt_baro_ft: Option<i32>,
    pub on_ground: bool,
    pub track_degrees: Option<f64>,
    pub payload: Value,
}

impl From<LiveAircraftRow> for LiveAircraftState {
    fn from(row: LiveAircraftRow) -> Self {
        let position = match (row.latitude, row.longitude) {
            (Some(lat), Some(lon)) => Position::new(lat, lon),
            _ => None,
        };
        let alt_baro = if row.on_ground {
            Some(BaroAltitude::Ground)
        } else {
            row.alt_baro_ft.map(BaroAltitude::Feet)
        };
        Self {
            hex: row.hex,
            flight: row.flight,
            category: row.category,
            last_seen: row.last_seen,
            position,
            alt_baro,
            track: row.track_degrees,
            payload: row.payload,
        }
    }
}
