//! PostgreSQL/PostGIS store tests. Skipped unless TEST_DATABASE_URL is set.

mod common;

use aircraft_digest::aircraft_report::AircraftReport;
use aircraft_digest::config::Thresholds;
use aircraft_digest::ingest::IngestPipeline;
use aircraft_digest::live_paths::{LivePath, PathKey};
use aircraft_digest::raw_positions::RawPositionRecord;
use aircraft_digest::store::{PgTrackingStore, TrackingStore, TransactionScope};
use aircraft_digest::track_points::TrackPoints;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use common::TestDatabase;
use serde_json::json;
use serial_test::serial;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap() + TimeDelta::seconds(secs)
}

fn fresh(hex: &str, flight: &str, lat: f64, lon: f64) -> AircraftReport {
    AircraftReport::from_value(json!({
        "hex": hex, "flight": flight, "lat": lat, "lon": lon, "seen": 0, "seen_pos": 0,
    }))
    .unwrap()
    .unwrap()
}

macro_rules! test_db_or_skip {
    () => {
        match TestDatabase::new().await.expect("Failed to create test database") {
            Some(db) => db,
            None => return,
        }
    };
}

#[tokio::test]
#[serial]
async fn test_pipeline_promotes_path_into_history() {
    let db = test_db_or_skip!();
    let pool = db.pool();
    let mut conn = pool.get().unwrap();
    let mut store = PgTrackingStore::new(&mut conn);
    let pipeline = IngestPipeline::new(Thresholds::default());

    for i in 0..6 {
        let lat = 64.1 + 0.003 * i as f64;
        let summary = pipeline
            .run_tick(&mut store, &[fresh("4cc581", "ICE123", lat, -21.9)], at(8 * i))
            .unwrap();
        assert_eq!(summary.recorded, 1);
    }

    let live = store
        .find_live_path(&PathKey::new("4cc581", "ICE123"))
        .unwrap()
        .unwrap();
    assert_eq!(live.point_count(), 6);
    assert_eq!(live.start_time, at(0));
    assert!(store.live_aircraft("4cc581").unwrap().is_some());

    let summary = pipeline.run_tick(&mut store, &[], at(200)).unwrap();
    assert_eq!(summary.archive.promoted, 1);
    assert_eq!(summary.archive.pruned_aircraft, 1);

    let history = store.historical_paths_for("4cc581").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].start_time, at(0));
    assert_eq!(history[0].end_time, at(40));
    assert_eq!(history[0].points, live.points);

    assert!(store.live_aircraft("4cc581").unwrap().is_none());
    assert!(
        store
            .find_live_path(&PathKey::new("4cc581", "ICE123"))
            .unwrap()
            .is_none()
    );
    assert_eq!(store.raw_positions_for("4cc581").unwrap().len(), 6);
}

#[tokio::test]
#[serial]
async fn test_stale_report_recorded_without_live_row() {
    let db = test_db_or_skip!();
    let pool = db.pool();
    let mut conn = pool.get().unwrap();
    let mut store = PgTrackingStore::new(&mut conn);
    let pipeline = IngestPipeline::new(Thresholds::default());

    let entry = json!({"hex": "a1b2c3", "seen": 120, "lat": 40.0, "lon": -74.0});
    let report = AircraftReport::from_value(entry.clone()).unwrap().unwrap();
    let summary = pipeline.run_tick(&mut store, &[report], at(0)).unwrap();

    assert_eq!(summary.live_skipped_stale, 1);
    assert!(store.live_aircraft("a1b2c3").unwrap().is_none());

    let raw = store.raw_positions_for("a1b2c3").unwrap();
    assert_eq!(raw.len(), 1);
    assert_eq!(raw[0].payload, entry);
    assert_eq!(raw[0].position.map(|p| p.longitude), Some(-74.0));
}

#[tokio::test]
#[serial]
async fn test_nested_rollback_discards_only_that_scope() {
    let db = test_db_or_skip!();
    let pool = db.pool();
    let mut conn = pool.get().unwrap();
    let mut store = PgTrackingStore::new(&mut conn);

    let first = RawPositionRecord::from_report(&fresh("aaaaaa", "", 1.0, 1.0), at(0));
    let second = RawPositionRecord::from_report(&fresh("bbbbbb", "", 2.0, 2.0), at(0));

    store.begin().unwrap();
    store.begin_nested().unwrap();
    store.append_raw_position(&first).unwrap();
    store.rollback_nested().unwrap();
    store.begin_nested().unwrap();
    store.append_raw_position(&second).unwrap();
    store.commit_nested().unwrap();
    store.commit().unwrap();

    assert!(store.raw_positions_for("aaaaaa").unwrap().is_empty());
    assert_eq!(store.raw_positions_for("bbbbbb").unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_outer_rollback_unwinds_open_savepoints() {
    let db = test_db_or_skip!();
    let pool = db.pool();
    let mut conn = pool.get().unwrap();
    let mut store = PgTrackingStore::new(&mut conn);

    let record = RawPositionRecord::from_report(&fresh("aaaaaa", "", 1.0, 1.0), at(0));

    store.begin().unwrap();
    store.append_raw_position(&record).unwrap();
    store.begin_nested().unwrap();
    store.rollback().unwrap();

    assert!(store.raw_positions_for("aaaaaa").unwrap().is_empty());
    assert!(store.begin_nested().is_err());
}

#[tokio::test]
#[serial]
async fn test_single_point_path_round_trips_and_duplicate_history_is_ignored() {
    let db = test_db_or_skip!();
    let pool = db.pool();
    let mut conn = pool.get().unwrap();
    let mut store = PgTrackingStore::new(&mut conn);

    let key = PathKey::new("4cc581", "");
    let mut points = TrackPoints::new();
    points.push(fresh("4cc581", "", 64.1, -21.9).position.unwrap());
    let path = LivePath {
        key: key.clone(),
        category: Some("A3".to_string()),
        start_time: at(0),
        last_seen: at(5),
        points,
    };
    store.insert_live_path(&path).unwrap();
    assert_eq!(store.find_live_path(&key).unwrap(), Some(path.clone()));

    let paths = store.live_paths_before(at(6)).unwrap();
    assert_eq!(paths.len(), 1);
    assert!(store.live_paths_before(at(5)).unwrap().is_empty());

    let historical = path.into_historical();
    assert!(store.insert_historical_path(&historical).unwrap());
    assert!(!store.insert_historical_path(&historical).unwrap());
    assert_eq!(store.historical_paths_for("4cc581").unwrap().len(), 1);
}
