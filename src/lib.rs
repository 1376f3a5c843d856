//! aircraft-digest - ADS-B snapshot ingest with live state and flight path archiving
//!
//! Each tick reads the receiver's `aircraft.json`, appends every report to the
//! raw position history, refreshes the live aircraft table, grows one live path
//! per (hex, flight) and finally promotes or discards paths that went quiet.

pub mod aircraft_report;
pub mod archiver;
pub mod config;
pub mod db;
pub mod ingest;
pub mod instance_lock;
pub mod live_aircraft;
pub mod live_paths;
pub mod live_state;
pub mod log_format;
pub mod metrics;
pub mod path_accumulator;
pub mod position_recorder;
pub mod raw_positions;
pub mod schema;
pub mod snapshot_reader;
pub mod store;
pub mod track_points;

pub use aircraft_report::AircraftReport;
pub use config::{IngestSettings, Thresholds};
pub use ingest::{IngestPipeline, TickSummary};
pub use store::{MemoryStore, PgTrackingStore, TrackingStore, TransactionScope};
