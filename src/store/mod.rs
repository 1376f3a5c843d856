//! Storage seam for the ingest pipeline
//!
//! The pipeline only talks to storage through [`TrackingStore`], so the same
//! lifecycle logic runs against PostgreSQL in production and against
//! [`MemoryStore`] in tests.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgTrackingStore;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::live_aircraft::LiveAircraftState;
use crate::live_paths::{HistoricalPath, LivePath, PathKey};
use crate::raw_positions::RawPositionRecord;

/// Transaction control, including nested scopes that can be rolled back on their own.
///
/// `begin`/`commit`/`rollback` delimit a whole tick. Inside it, every
/// `begin_nested` must be paired with exactly one `commit_nested` or
/// `rollback_nested`; rolling back a nested scope undoes only the writes made
/// since its `begin_nested`.
pub trait TransactionScope {
    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;

    fn begin_nested(&mut self) -> Result<()>;
    fn commit_nested(&mut self) -> Result<()>;
    fn rollback_nested(&mut self) -> Result<()>;
}

/// The four logical stores the ingest core reads and writes
pub trait TrackingStore: TransactionScope {
    /// Append to the raw position history. Never updates existing rows.
    fn append_raw_position(&mut self, record: &RawPositionRecord) -> Result<()>;

    /// Insert or wholesale-replace the live row for `state.hex`
    fn replace_live_aircraft(&mut self, state: &LiveAircraftState) -> Result<()>;

    /// Delete live aircraft whose last_seen is strictly before `cutoff`
    fn delete_live_aircraft_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize>;

    fn find_live_path(&mut self, key: &PathKey) -> Result<Option<LivePath>>;

    fn insert_live_path(&mut self, path: &LivePath) -> Result<()>;

    /// Persist category, last_seen and points of an existing path in one write
    fn update_live_path(&mut self, path: &LivePath) -> Result<()>;

    /// Live paths whose last_seen is strictly before `cutoff`
    fn live_paths_before(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<LivePath>>;

    fn delete_live_path(&mut self, key: &PathKey) -> Result<()>;

    /// Insert into the historical store. Returns false when a path with the same
    /// (hex, flight, start_time) already exists; the existing row is left as is.
    fn insert_historical_path(&mut self, path: &HistoricalPath) -> Result<bool>;
}
