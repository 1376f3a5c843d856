use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use diesel::prelude::*;
use postgis_diesel::types::{LineString, Point};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::track_points::TrackPoints;

const WGS84_SRID: u32 = 4326;

/// Identity of a live path: aircraft hex plus callsign ('' when unknown)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PathKey {
    pub hex: String,
    pub flight: String,
}

impl PathKey {
    pub fn new(hex: impl Into<String>, flight: impl Into<String>) -> Self {
        Self {
            hex: hex.into(),
            flight: flight.into(),
        }
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.flight.is_empty() {
            write!(f, "{}", self.hex)
        } else {
            write!(f, "{}/{}", self.hex, self.flight)
        }
    }
}

/// A track still being accumulated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivePath {
    pub key: PathKey,
    pub category: Option<String>,
    /// Set when the row is created, never updated
    pub start_time: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub points: TrackPoints,
}

impl LivePath {
    pub fn duration(&self) -> TimeDelta {
        self.last_seen - self.start_time
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn total_length_km(&self) -> f64 {
        self.points.length_km()
    }

    /// Freeze this path into its archived form; `end_time` is the last time it was seen
    pub fn into_historical(self) -> HistoricalPath {
        let total_length_km = self.total_length_km();
        HistoricalPath {
            key: self.key,
            category: self.category,
            start_time: self.start_time,
            end_time: self.last_seen,
            points: self.points,
            total_length_km,
        }
    }
}

/// A completed track that passed the quality filter; immutable once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPath {
    pub key: PathKey,
    pub category: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub points: TrackPoints,
    pub total_length_km: f64,
}

/// PostGIS rejects single-point linestrings, so geometry only exists from two points on
fn line_geometry(points: &TrackPoints) -> Option<LineString<Point>> {
    if points.len() < 2 {
        return None;
    }
    Some(LineString {
        points: points
            .coordinates()
            .iter()
            .map(|[lon, lat]| Point::new(*lon, *lat, Some(WGS84_SRID)))
            .collect(),
        srid: Some(WGS84_SRID),
    })
}

fn point_count_column(points: &TrackPoints) -> i32 {
    i32::try_from(points.len()).unwrap_or(i32::MAX)
}

/// Row read from aircraft_paths_live (geometry is derived, so never read back)
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::aircraft_paths_live)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LivePathRow {
    pub hex: String,
    pub flight: String,
    pub category: Option<String>,
    pub start_time: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub points: Value,
}

impl TryFrom<LivePathRow> for LivePath {
    type Error = anyhow::Error;

    fn try_from(row: LivePathRow) -> Result<Self> {
        Ok(Self {
            key: PathKey::new(row.hex, row.flight),
            category: row.category,
            start_time: row.start_time,
            last_seen: row.last_seen,
            points: TrackPoints::from_json(row.points)?,
        })
    }
}

/// Insert model for a brand new live path
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::aircraft_paths_live)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewLivePathModel {
    pub hex: String,
    pub flight: String,
    pub category: Option<String>,
    pub start_time: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub points: Value,
    pub point_count: i32,
    pub total_length_km: f64,
    pub geom: Option<LineString<Point>>,
}

impl From<&LivePath> for NewLivePathModel {
    fn from(path: &LivePath) -> Self {
        Self {
            hex: path.key.hex.clone(),
            flight: path.key.flight.clone(),
            category: path.category.clone(),
            start_time: path.start_time,
            last_seen: path.last_seen,
            points: path.points.to_json(),
            point_count: point_count_column(&path.points),
            total_length_km: path.total_length_km(),
            geom: line_geometry(&path.points),
        }
    }
}

/// Everything an update may change; the key and start_time are fixed at creation.
/// Points, length and geometry are always written together.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = crate::schema::aircraft_paths_live)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LivePathChangeset {
    pub category: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub points: Value,
    pub point_count: i32,
    pub total_length_km: f64,
    pub geom: Option<LineString<Point>>,
}

impl From<&LivePath> for LivePathChangeset {
    fn from(path: &LivePath) -> Self {
        Self {
            category: path.category.clone(),
            last_seen: path.last_seen,
            points: path.points.to_json(),
            point_count: point_count_column(&path.points),
            total_length_km: path.total_length_km(),
            geom: line_geometry(&path.points),
        }
    }
}

/// Insert model for aircraft_paths_history
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::aircraft_paths_history)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewHistoricalPathModel {
    pub hex: String,
    pub flight: String,
    pub category: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub points: Value,
    pub point_count: i32,
    pub total_length_km: f64,
    pub geom: Option<LineString<Point>>,
}

impl From<&HistoricalPath> for NewHistoricalPathModel {
    fn from(path: &HistoricalPath) -> Self {
        Self {
            hex: path.key.hex.clone(),
            flight: path.key.flight.clone(),
            category: path.category.clone(),
            start_time: path.start_time,
            end_time: path.end_time,
            points: path.points.to_json(),
            point_count: point_count_column(&path.points),
            total_length_km: path.total_length_km,
            geom: line_geometry(&path.points),
        }
    }
}

/// Row read from aircraft_paths_history
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::aircraft_paths_history)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct HistoricalPathRow {
    pub hex: String,
    pub flight: String,
    pub category: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub points: Value,
    pub total_length_km: f64,
}

impl TryFrom<HistoricalPathRow> for HistoricalPath {
    type Error = anyhow::Error;

    fn try_from(row: HistoricalPathRow) -> Result<Self> {
        Ok(Self {
            key: PathKey::new(row.hex, row.flight),
            category: row.category,
            start_time: row.start_time,
            end_time: row.end_time,
            points: TrackPoints::from_json(row.points)?,
            total_length_km: row.total_length_km,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aircraft_report::Position;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_736_942_400 + secs, 0).unwrap()
    }

    #[test]
    fn test_path_key_display() {
        assert_eq!(PathKey::new("4cc581", "ICE501").to_string(), "4cc581/ICE501");
        assert_eq!(PathKey::new("4cc581", "").to_string(), "4cc581");
    }

    #[test]
    fn test_into_historical_keeps_points_and_span() {
        let mut points = TrackPoints::starting_at(Position::new(64.10, -21.90).unwrap());
        points.push(Position::new(64.11, -21.90).unwrap());

        let live = LivePath {
            key: PathKey::new("4cc581", "ICE501"),
            category: Some("A3".into()),
            start_time: at(0),
            last_seen: at(40),
            points: points.clone(),
        };
        assert_eq!(live.duration(), TimeDelta::seconds(40));

        let historical = live.into_historical();
        assert_eq!(historical.start_time, at(0));
        assert_eq!(historical.end_time, at(40));
        assert_eq!(historical.points, points);
        assert!((historical.total_length_km - 1.112).abs() < 0.01);
    }

    #[test]
    fn test_line_geometry_needs_two_points() {
        let mut points = TrackPoints::starting_at(Position::new(64.10, -21.90).unwrap());
        assert!(line_geometry(&points).is_none());

        points.push(Position::new(64.11, -21.90).unwrap());
        let line = line_geometry(&points).unwrap();
        assert_eq!(line.points.len(), 2);
        assert_eq!(line.srid, Some(WGS84_SRID));
        assert_eq!(line.points[0].x, -21.90);
        assert_eq!(line.points[0].y, 64.10);
    }
}
