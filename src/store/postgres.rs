use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use diesel::PgConnection;
use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::prelude::*;
use tracing::trace;

use super::{TrackingStore, TransactionScope};
use crate::live_aircraft::{LiveAircraftModel, LiveAircraftRow, LiveAircraftState};
use crate::live_paths::{
    HistoricalPath, HistoricalPathRow, LivePath, LivePathChangeset, LivePathRow, NewHistoricalPathModel,
    NewLivePathModel, PathKey,
};
use crate::raw_positions::{NewRawPositionModel, RawPositionRecord, RawPositionRow};

/// PostgreSQL/PostGIS store over a single connection.
///
/// The outer transaction is a plain BEGIN; nested scopes are savepoints managed
/// by diesel's transaction manager, so a failed statement inside a nested scope
/// only poisons that savepoint.
pub struct PgTrackingStore<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> PgTrackingStore<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Self { conn }
    }

    fn depth(&mut self) -> Result<u32> {
        let depth = AnsiTransactionManager::transaction_manager_status_mut(&mut *self.conn)
            .transaction_depth()?;
        Ok(depth.map_or(0, |d| d.get()))
    }

    pub fn live_aircraft(&mut self, hex_val: &str) -> Result<Option<LiveAircraftState>> {
        use crate::schema::aircraft_live::dsl::*;

        let row = aircraft_live
            .find(hex_val)
            .select(LiveAircraftRow::as_select())
            .first(&mut *self.conn)
            .optional()?;
        Ok(row.map(Into::into))
    }

    pub fn raw_positions_for(&mut self, hex_val: &str) -> Result<Vec<RawPositionRecord>> {
        use crate::schema::aircraft_positions_history::dsl::*;

        let rows: Vec<RawPositionRow> = aircraft_positions_history
            .filter(hex.eq(hex_val))
            .order(id.asc())
            .select(RawPositionRow::as_select())
            .load(&mut *self.conn)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub fn historical_paths_for(&mut self, hex_val: &str) -> Result<Vec<HistoricalPath>> {
        use crate::schema::aircraft_paths_history::dsl::*;

        let rows: Vec<HistoricalPathRow> = aircraft_paths_history
            .filter(hex.eq(hex_val))
            .order(start_time.asc())
            .select(HistoricalPathRow::as_select())
            .load(&mut *self.conn)?;
        rows.into_iter().map(HistoricalPath::try_from).collect()
    }
}

impl TransactionScope for PgTrackingStore<'_> {
    fn begin(&mut self) -> Result<()> {
        if self.depth()? != 0 {
            anyhow::bail!("Transaction already open; use begin_nested");
        }
        AnsiTransactionManager::begin_transaction(&mut *self.conn)
            .context("Failed to begin transaction")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        AnsiTransactionManager::commit_transaction(&mut *self.conn)
            .context("Failed to commit transaction")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        // Unwind any savepoints left open by a failure mid-record
        while self.depth()? > 0 {
            AnsiTransactionManager::rollback_transaction(&mut *self.conn)
                .context("Failed to roll back transaction")?;
        }
        Ok(())
    }

    fn begin_nested(&mut self) -> Result<()> {
        if self.depth()? == 0 {
            anyhow::bail!("Nested scope requires an open transaction");
        }
        AnsiTransactionManager::begin_transaction(&mut *self.conn)
            .context("Failed to create savepoint")?;
        Ok(())
    }

    fn commit_nested(&mut self) -> Result<()> {
        if self.depth()? < 2 {
            anyhow::bail!("No nested scope to commit");
        }
        AnsiTransactionManager::commit_transaction(&mut *self.conn)
            .context("Failed to release savepoint")?;
        Ok(())
    }

    fn rollback_nested(&mut self) -> Result<()> {
        if self.depth()? < 2 {
            anyhow::bail!("No nested scope to roll back");
        }
        AnsiTransactionManager::rollback_transaction(&mut *self.conn)
            .context("Failed to roll back to savepoint")?;
        Ok(())
    }
}

impl TrackingStore for PgTrackingStore<'_> {
    fn append_raw_position(&mut self, record: &RawPositionRecord) -> Result<()> {
        use crate::schema::aircraft_positions_history;

        diesel::insert_into(aircraft_positions_history::table)
            .values(NewRawPositionModel::from(record))
            .execute(&mut *self.conn)?;
        Ok(())
    }

    fn replace_live_aircraft(&mut self, state: &LiveAircraftState) -> Result<()> {
        use crate::schema::aircraft_live;

        let model = LiveAircraftModel::from(state);
        diesel::insert_into(aircraft_live::table)
            .values(&model)
            .on_conflict(aircraft_live::hex)
            .do_update()
            .set(&model)
            .execute(&mut *self.conn)?;
        Ok(())
    }

    fn delete_live_aircraft_before(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        use crate::schema::aircraft_live::dsl::*;

        let deleted =
            diesel::delete(aircraft_live.filter(last_seen.lt(cutoff))).execute(&mut *self.conn)?;
        Ok(deleted)
    }

    fn find_live_path(&mut self, key: &PathKey) -> Result<Option<LivePath>> {
        use crate::schema::aircraft_paths_live::dsl::*;

        let row = aircraft_paths_live
            .find((&key.hex, &key.flight))
            .select(LivePathRow::as_select())
            .for_update()
            .first(&mut *self.conn)
            .optional()?;
        row.map(LivePath::try_from).transpose()
    }

    fn insert_live_path(&mut self, path: &LivePath) -> Result<()> {
        use crate::schema::aircraft_paths_live;

        diesel::insert_into(aircraft_paths_live::table)
            .values(NewLivePathModel::from(path))
            .execute(&mut *self.conn)?;
        Ok(())
    }

    fn update_live_path(&mut self, path: &LivePath) -> Result<()> {
        use crate::schema::aircraft_paths_live::dsl::*;

        let updated = diesel::update(aircraft_paths_live.find((&path.key.hex, &path.key.flight)))
            .set(LivePathChangeset::from(path))
            .execute(&mut *self.conn)?;
        if updated == 0 {
            anyhow::bail!("Live path {} does not exist", path.key);
        }
        Ok(())
    }

    fn live_paths_before(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<LivePath>> {
        use crate::schema::aircraft_paths_live::dsl::*;

        let rows: Vec<LivePathRow> = aircraft_paths_live
            .filter(last_seen.lt(cutoff))
            .order((hex.asc(), flight.asc()))
            .select(LivePathRow::as_select())
            .for_update()
            .load(&mut *self.conn)?;
        trace!("{} live paths older than {}", rows.len(), cutoff);
        rows.into_iter().map(LivePath::try_from).collect()
    }

    fn delete_live_path(&mut self, key: &PathKey) -> Result<()> {
        use crate::schema::aircraft_paths_live::dsl::*;

        diesel::delete(aircraft_paths_live.find((&key.hex, &key.flight)))
            .execute(&mut *self.conn)?;
        Ok(())
    }

    fn insert_historical_path(&mut self, path: &HistoricalPath) -> Result<bool> {
        use crate::schema::aircraft_paths_history;

        let inserted = diesel::insert_into(aircraft_paths_history::table)
            .values(NewHistoricalPathModel::from(path))
            .on_conflict_do_nothing()
            .execute(&mut *self.conn)?;
        Ok(inserted == 1)
    }
}
