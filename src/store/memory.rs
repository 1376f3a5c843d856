use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

use super::{TrackingStore, TransactionScope};
use crate::live_aircraft::LiveAircraftState;
use crate::live_paths::{HistoricalPath, LivePath, PathKey};
use crate::raw_positions::RawPositionRecord;

/// Tables rows are updated and deleted in; bounded by current traffic
#[derive(Debug, Clone, Default)]
struct LiveTables {
    live_aircraft: BTreeMap<String, LiveAircraftState>,
    live_paths: BTreeMap<PathKey, LivePath>,
}

#[derive(Debug, Clone)]
struct Savepoint {
    live: LiveTables,
    raw_len: usize,
    history_len: usize,
}

/// In-process store, used by the lifecycle tests.
///
/// Every `begin`/`begin_nested` pushes a savepoint holding a copy of the live
/// tables and the lengths of the append-only ones; rollback restores the copy
/// and truncates, commit discards the savepoint. Writes outside any
/// transaction apply directly.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    live: LiveTables,
    raw_positions: Vec<RawPositionRecord>,
    /// Insertion order; `historical_keys` enforces (hex, flight, start_time) uniqueness
    historical_paths: Vec<HistoricalPath>,
    historical_keys: BTreeSet<(PathKey, DateTime<Utc>)>,
    savepoints: Vec<Savepoint>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open transaction scopes (outer plus nested)
    pub fn transaction_depth(&self) -> usize {
        self.savepoints.len()
    }

    pub fn raw_positions(&self) -> &[RawPositionRecord] {
        &self.raw_positions
    }

    pub fn raw_positions_for(&self, hex: &str) -> Vec<&RawPositionRecord> {
        self.raw_positions.iter().filter(|r| r.hex == hex).collect()
    }

    pub fn live_aircraft(&self, hex: &str) -> Option<&LiveAircraftState> {
        self.live.live_aircraft.get(hex)
    }

    pub fn live_aircraft_count(&self) -> usize {
        self.live.live_aircraft.len()
    }

    pub fn live_path(&self, key: &PathKey) -> Option<&LivePath> {
        self.live.live_paths.get(key)
    }

    pub fn live_path_count(&self) -> usize {
        self.live.live_paths.len()
    }

    /// Historical paths ordered by (hex, flight, start_time)
    pub fn historical_paths(&self) -> Vec<&HistoricalPath> {
        let mut paths: Vec<&HistoricalPath> = self.historical_paths.iter().collect();
        paths.sort_by(|a, b| (&a.key, a.start_time).cmp(&(&b.key, b.start_time)));
        paths
    }

    fn open_scope(&mut self) {
        self.savepoints.push(Savepoint {
            live: self.live.clone(),
            raw_len: self.raw_positions.len(),
            history_len: self.historical_paths.len(),
        });
    }

    fn restore(&mut self, saved: Savepoint) {
        self.live = saved.live;
        self.raw_positions.truncate(saved.raw_len);
        for path in self.historical_paths.drain(saved.history_len..) {
            self.historical_keys.remove(&(path.key, path.start_time));
        }
    }

    fn close_scope(&mut self, restore: bool) -> Result<()> {
        let Some(saved) = self.savepoints.pop() else {
            anyhow::bail!("No open transaction");
        };
        if restore {
            self.restore(saved);
        }
        Ok(())
    }
}

impl TransactionScope for MemoryStore {
    fn begin(&mut self) -> Result<()> {
        if !self.savepoints.is_empty() {
            anyhow::bail!("Transaction already open; use begin_nested");
        }
        self.open_scope();
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.savepoints.len() != 1 {
            anyhow::bail!(
                "Cannot commit outer transaction with {} open scopes",
                self.savepoints.len()
            );
        }
        self.close_scope(false)
    }

    fn rollback(&mut self) -> Result<()> {
        // Unwind everything, nested scopes included
        if self.savepoints.is_empty() {
            anyhow::bail!("No open transaction");
        }
        let outer = self.savepoints.swap_remove(0);
        self.savepoints.clear();
        self.restore(outer);
        Ok(())
    }

    fn begin_nested(&mut self) -> Result<()> {
        if self.savepoints.is_empty() {
            anyhow::bail!("Nested scope requires an open transaction");
        }
        self.open_scope();
        Ok(())
    }

    fn commit_nested(&mut self) -> Result<()> {
        if self.savepoints.len() < 2 {
            anyhow::bail!("No nested scope to commit");
        }
        self.close_scope(false)
    }

    fn rollback_nested(&mut self) -> Result<()> {
        if self.savepoints.len() < 2 {
            anyhow::bail!("No nested scope to roll back");
        }
        self.close_scope(true)
    }
}

impl TrackingStore for MemoryStore {
    fn append_raw_position(&mut self, record: &RawPositionRecord) -> Result<()> {
        self.raw_positions.push(record.clone());
        Ok(())
    }

    fn replace_live_aircraft(&mut self, state: &LiveAircraftState) -> Result<()> {
        self.live
            .live_aircraft
            .insert(state.hex.clone(), state.clone());
        Ok(())
    }

    fn delete_live_aircraft_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        let before = self.live.live_aircraft.len();
        self.live
            .live_aircraft
            .retain(|_, state| state.last_seen >= cutoff);
        Ok(before - self.live.live_aircraft.len())
    }

    fn find_live_path(&mut self, key: &PathKey) -> Result<Option<LivePath>> {
        Ok(self.live.live_paths.get(key).cloned())
    }

    fn insert_live_path(&mut self, path: &LivePath) -> Result<()> {
        if self.live.live_paths.contains_key(&path.key) {
            anyhow::bail!("Live path {} already exists", path.key);
        }
        self.live.live_paths.insert(path.key.clone(), path.clone());
        Ok(())
    }

    fn update_live_path(&mut self, path: &LivePath) -> Result<()> {
        let Some(existing) = self.live.live_paths.get_mut(&path.key) else {
            anyhow::bail!("Live path {} does not exist", path.key);
        };
        existing.category = path.category.clone();
        existing.last_seen = path.last_seen;
        existing.points = path.points.clone();
        Ok(())
    }

    fn live_paths_before(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<LivePath>> {
        Ok(self
            .live
            .live_paths
            .values()
            .filter(|p| p.last_seen < cutoff)
            .cloned()
            .collect())
    }

    fn delete_live_path(&mut self, key: &PathKey) -> Result<()> {
        self.live.live_paths.remove(key);
        Ok(())
    }

    fn insert_historical_path(&mut self, path: &HistoricalPath) -> Result<bool> {
        if !self
            .historical_keys
            .insert((path.key.clone(), path.start_time))
        {
            return Ok(false);
        }
        self.historical_paths.push(path.clone());
        Ok(true)
    }
}
