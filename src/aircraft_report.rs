//! Aircraft reports as written by a dump1090-style receiver into `aircraft.json`
//!
//! The receiver rewrites the whole file every second or so:
//!
//! ```json
//! { "now": 1736942400.1, "messages": 81234,
//!   "aircraft": [ { "hex": "4cc581", "flight": "ICE501  ", "lat": 64.1, "lon": -21.9,
//!                   "alt_baro": 3000, "track": 271.3, "seen": 0.4, "seen_pos": 1.2 } ] }
//! ```
//!
//! `seen` is the age of the last message from the aircraft, `seen_pos` the age of
//! the last position. Both are absent when the receiver has nothing to report;
//! they are kept as `Option` here instead of being replaced by a magic number.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::config::seconds_to_delta;

/// Age assumed for a report whose `seen` is absent or unparsable
pub const UNTRUSTED_SEEN_SECS: f64 = 9999.0;

/// A WGS84 position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    /// Build a position, rejecting coordinates outside WGS84 ranges
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        Some(Self {
            latitude,
            longitude,
        })
    }
}

/// Barometric altitude as reported by the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaroAltitude {
    Feet(i32),
    Ground,
}

impl BaroAltitude {
    pub fn feet(&self) -> Option<i32> {
        match self {
            BaroAltitude::Feet(feet) => Some(*feet),
            BaroAltitude::Ground => None,
        }
    }

    pub fn is_ground(&self) -> bool {
        matches!(self, BaroAltitude::Ground)
    }
}

/// One entry of the snapshot's `aircraft` array
#[derive(Debug, Clone, PartialEq)]
pub struct AircraftReport {
    /// ICAO address (or `~`-prefixed non-ICAO address), lowercased
    pub hex: String,
    /// Callsign with padding removed; `None` when blank
    pub flight: Option<String>,
    pub category: Option<String>,
    pub position: Option<Position>,
    pub alt_baro: Option<BaroAltitude>,
    pub track: Option<f64>,
    /// Seconds since the aircraft was last heard
    pub seen: Option<f64>,
    /// Seconds since the position was last updated
    pub seen_pos: Option<f64>,
    /// The entry exactly as received
    pub payload: Value,
}

/// Fields read from a raw entry; anything else stays in the payload only
#[derive(Debug, Deserialize)]
struct AircraftEntry {
    hex: Option<String>,
    flight: Option<String>,
    category: Option<String>,
    lat: Option<Value>,
    lon: Option<Value>,
    alt_baro: Option<Value>,
    track: Option<Value>,
    seen: Option<Value>,
    seen_pos: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SnapshotDocument {
    #[serde(default)]
    aircraft: Vec<Value>,
}

/// Result of parsing one snapshot document
#[derive(Debug, Default)]
pub struct ParsedSnapshot {
    pub reports: Vec<AircraftReport>,
    /// Entries dropped because they carried no usable `hex`
    pub skipped_no_hex: usize,
    /// Entries dropped because they were not JSON objects of the expected shape
    pub skipped_malformed: usize,
}

/// Accept JSON numbers and numeric strings; anything else is absent
fn lenient_f64(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_alt_baro(value: Option<&Value>) -> Option<BaroAltitude> {
    match value? {
        Value::String(s) if s.trim().eq_ignore_ascii_case("ground") => Some(BaroAltitude::Ground),
        other => lenient_f64(Some(other)).map(|feet| BaroAltitude::Feet(feet.round() as i32)),
    }
}

impl AircraftReport {
    /// Build a report from one raw entry.
    ///
    /// Returns `Ok(None)` for entries without a usable `hex`; those are dropped
    /// before any store write. Returns an error when the entry is not an object
    /// with the expected field types.
    pub fn from_value(payload: Value) -> Result<Option<Self>> {
        let entry: AircraftEntry =
            serde_json::from_value(payload.clone()).context("Malformed aircraft entry")?;

        let Some(hex) = non_blank(entry.hex).map(|h| h.to_ascii_lowercase()) else {
            return Ok(None);
        };

        let position = match (
            lenient_f64(entry.lat.as_ref()),
            lenient_f64(entry.lon.as_ref()),
        ) {
            (Some(lat), Some(lon)) => Position::new(lat, lon),
            _ => None,
        };

        Ok(Some(Self {
            hex,
            flight: non_blank(entry.flight),
            category: non_blank(entry.category),
            position,
            alt_baro: parse_alt_baro(entry.alt_baro.as_ref()),
            track: lenient_f64(entry.track.as_ref()),
            seen: lenient_f64(entry.seen.as_ref()).filter(|s| *s >= 0.0),
            seen_pos: lenient_f64(entry.seen_pos.as_ref()).filter(|s| *s >= 0.0),
            payload,
        }))
    }

    /// Age of the report in seconds, with absent values treated as untrusted
    pub fn seen_secs(&self) -> f64 {
        self.seen.unwrap_or(UNTRUSTED_SEEN_SECS)
    }

    /// `now - seen`: when the receiver last heard this aircraft
    pub fn last_seen_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - seconds_to_delta(self.seen_secs())
    }

    /// Key used for live paths: the callsign, or the empty string when unknown
    pub fn flight_key(&self) -> &str {
        self.flight.as_deref().unwrap_or("")
    }
}

/// Parse a whole snapshot document.
///
/// A document that is not valid JSON (typically a file caught mid-write) is an
/// error; individual bad entries are only counted.
pub fn parse_snapshot(bytes: &[u8]) -> Result<ParsedSnapshot> {
    let document: SnapshotDocument =
        serde_json::from_slice(bytes).context("Failed to parse aircraft snapshot")?;

    let mut parsed = ParsedSnapshot::default();
    for entry in document.aircraft {
        match AircraftReport::from_value(entry) {
            Ok(Some(report)) => parsed.reports.push(report),
            Ok(None) => parsed.skipped_no_hex += 1,
            Err(e) => {
                trace!("Dropping aircraft entry: {:#}", e);
                parsed.skipped_malformed += 1;
            }
        }
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_entry() {
        let report = AircraftReport::from_value(json!({
            "hex": "4CC581",
            "flight": "ICE501  ",
            "category": "A3",
            "lat": 64.1,
            "lon": -21.9,
            "alt_baro": 3000,
            "track": 271.3,
            "seen": 0.4,
            "seen_pos": 1.2,
            "rssi": -12.5
        }))
        .unwrap()
        .unwrap();

        assert_eq!(report.hex, "4cc581");
        assert_eq!(report.flight.as_deref(), Some("ICE501"));
        assert_eq!(report.category.as_deref(), Some("A3"));
        assert_eq!(report.position, Position::new(64.1, -21.9));
        assert_eq!(report.alt_baro, Some(BaroAltitude::Feet(3000)));
        assert_eq!(report.track, Some(271.3));
        assert_eq!(report.seen, Some(0.4));
        assert_eq!(report.seen_pos, Some(1.2));
        // Unknown fields survive in the payload
        assert_eq!(report.payload["rssi"], json!(-12.5));
    }

    #[test]
    fn test_missing_hex_is_dropped() {
        assert!(
            AircraftReport::from_value(json!({"lat": 1.0, "lon": 2.0}))
                .unwrap()
                .is_none()
        );
        assert!(
            AircraftReport::from_value(json!({"hex": "   "}))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_blank_flight_and_ground_altitude() {
        let report = AircraftReport::from_value(json!({
            "hex": "a12345", "flight": "        ", "alt_baro": "ground"
        }))
        .unwrap()
        .unwrap();

        assert_eq!(report.flight, None);
        assert_eq!(report.flight_key(), "");
        assert_eq!(report.alt_baro, Some(BaroAltitude::Ground));
        assert!(report.position.is_none());
    }

    #[test]
    fn test_untrusted_ages() {
        let report = AircraftReport::from_value(json!({
            "hex": "a12345", "seen": "soon", "seen_pos": null
        }))
        .unwrap()
        .unwrap();

        assert_eq!(report.seen, None);
        assert_eq!(report.seen_pos, None);
        assert_eq!(report.seen_secs(), UNTRUSTED_SEEN_SECS);
    }

    #[test]
    fn test_half_or_invalid_position_is_absent() {
        let half = AircraftReport::from_value(json!({"hex": "a1", "lat": 64.0}))
            .unwrap()
            .unwrap();
        assert!(half.position.is_none());

        let out_of_range = AircraftReport::from_value(json!({"hex": "a1", "lat": 95.0, "lon": 10.0}))
            .unwrap()
            .unwrap();
        assert!(out_of_range.position.is_none());
    }

    #[test]
    fn test_last_seen_at() {
        let now = DateTime::parse_from_rfc3339("2025-01-15T12:00:30Z")
            .unwrap()
            .with_timezone(&Utc);
        let report = AircraftReport::from_value(json!({"hex": "a1", "seen": 5}))
            .unwrap()
            .unwrap();
        assert_eq!(
            report.last_seen_at(now),
            DateTime::parse_from_rfc3339("2025-01-15T12:00:25Z")
                .unwrap()
                .with_timezone(&Utc)
        );
    }

    #[test]
    fn test_parse_snapshot_counts_skips() {
        let parsed = parse_snapshot(
            br#"{"now": 1736942400.0, "aircraft": [
                {"hex": "4cc581", "seen": 1},
                {"flight": "NOHEX"},
                {"hex": 12345},
                "garbage"
            ]}"#,
        )
        .unwrap();

        assert_eq!(parsed.reports.len(), 1);
        assert_eq!(parsed.skipped_no_hex, 1);
        assert_eq!(parsed.skipped_malformed, 2);
    }

    #[test]
    fn test_parse_truncated_snapshot_fails() {
        assert!(parse_snapshot(br#"{"aircraft": [{"hex": "4cc5"#).is_err());
    }

    #[test]
    fn test_parse_snapshot_without_aircraft_field() {
        let parsed = parse_snapshot(br#"{"now": 1.0}"#).unwrap();
        assert!(parsed.reports.is_empty());
    }
}
