use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::aircraft_report::{AircraftReport, Position};

/// One row of the append-only raw position history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPositionRecord {
    pub id: Uuid,
    pub hex: String,
    pub flight: Option<String>,
    /// Ingest time, not the receiver's report time
    pub observed_at: DateTime<Utc>,
    pub position: Option<Position>,
    pub payload: Value,
}

impl RawPositionRecord {
    pub fn from_report(report: &AircraftReport, observed_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            hex: report.hex.clone(),
            flight: report.flight.clone(),
            observed_at,
            position: report.position,
            payload: report.payload.clone(),
        }
    }
}

/// Insert model for aircraft_positions_history; `geom` is generated by the database
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::aircraft_positions_history)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewRawPositionModel {
    pub id: Uuid,
    pub hex: String,
    pub flight: Option<String>,
    pub observed_at: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub payload: Value,
}

impl From<&RawPositionRecord> for NewRawPositionModel {
    fn from(record: &RawPositionRecord) -> Self {
        Self {
            id: record.id,
            hex: record.hex.clone(),
            flight: record.flight.clone(),
            observed_at: record.observed_at,
            latitude: record.position.map(|p| p.latitude),
            longitude: record.position.map(|p| p.longitude),
            payload: record.payload.clone(),
        }
    }
}

/// Row read back from aircraft_positions_history
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::aircraft_positions_history)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RawPositionRow {
    pub id: Uuid,
    pub hex: String,
    pub flight: Option<String>,
    pub observed_at: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub payload: Value,
}

impl From<RawPositionRow> for RawPositionRecord {
    fn from(row: RawPositionRow) -> Self {
        let position = match (row.latitude, row.longitude) {
            (Some(lat), Some(lon)) => Position::new(lat, lon),
            _ => None,
        };
        Self {
            id: row.id,
            hex: row.hex,
            flight: row.flight,
            observed_at: row.observed_at,
            position,
            payload: row.payload,
        }
    }
}
