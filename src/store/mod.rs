//! Storage module for persisting coalesced snapshots
//!
//! Uses SQLite for local retention of:
//! - Snapshot headers (timestamp, zone, battery level, totals)
//! - Per-snapshot coalesced consumer rows

use crate::core::{ConsumerKind, ConsumerRecord, DeviceSnapshot, Error, Result};
use rusqlite::{params, Connection};
use std::path::PathBuf;

/// Backing store for the snapshot timeline.
///
/// Append-only from the engine's point of view; pruning always removes whole
/// timestamps, so a reload never sees a header without its consumer rows.
pub trait SnapshotStore {
    /// Persist one coalesced snapshot.
    fn append(&self, snapshot: &DeviceSnapshot) -> Result<()>;

    /// Load every snapshot at or after `since_ms`, oldest first.
    fn load_window(&self, since_ms: i64) -> Result<Vec<DeviceSnapshot>>;

    /// Delete snapshots strictly older than `cutoff_ms`. Returns how many
    /// snapshots were removed.
    fn prune_older_than(&self, cutoff_ms: i64) -> Result<u64>;

    /// Total snapshots currently retained.
    fn snapshot_count(&self) -> Result<i64>;
}

/// SQLite-backed snapshot store
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the store at the default data path
    pub fn new() -> Result<Self> {
        let db_path = Self::db_path()?;
        let conn = Connection::open(&db_path)?;

        let store = Self { conn };
        store.init_schema()?;

        Ok(store)
    }

    /// In-memory store, used by tests and the demo binary
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        let store = Self { conn };
        store.init_schema()?;

        Ok(store)
    }

    /// Get the database file path
    fn db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| Error::Database(rusqlite::Error::InvalidPath(PathBuf::new())))?;

        let app_dir = data_dir.join("drainscope");
        std::fs::create_dir_all(&app_dir)?;

        Ok(app_dir.join("usage.db"))
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            -- Snapshot headers
            CREATE TABLE IF NOT EXISTS snapshots (
                timestamp INTEGER PRIMARY KEY,
                zone_id TEXT NOT NULL,
                battery_level INTEGER NOT NULL,
                total_power REAL NOT NULL,
                discharge_percent INTEGER NOT NULL
            );

            -- One row per coalesced consumer per snapshot
            CREATE TABLE IF NOT EXISTS snapshot_consumers (
                timestamp INTEGER NOT NULL,
                identity_key TEXT NOT NULL,
                raw_id INTEGER NOT NULL,
                kind INTEGER NOT NULL,
                consumed_power REAL NOT NULL,
                foreground_time_ms INTEGER NOT NULL,
                background_time_ms INTEGER NOT NULL,
                package_hint TEXT,
                is_hidden INTEGER NOT NULL,
                PRIMARY KEY (timestamp, identity_key)
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_consumers_timestamp ON snapshot_consumers(timestamp);
            "#,
        )?;

        Ok(())
    }

    /// Load the consumer rows belonging to one snapshot
    fn load_consumers(&self, timestamp_ms: i64) -> Result<Vec<ConsumerRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT identity_key, raw_id, kind, consumed_power, foreground_time_ms,
                    background_time_ms, package_hint, is_hidden
             FROM snapshot_consumers
             WHERE timestamp = ?1
             ORDER BY identity_key ASC",
        )?;

        let consumers = stmt
            .query_map(params![timestamp_ms], |row| {
                let kind_tag: i64 = row.get(2)?;
                Ok(ConsumerRecord {
                    identity_key: row.get(0)?,
                    raw_id: row.get(1)?,
                    kind: ConsumerKind::from_db(kind_tag).unwrap_or(ConsumerKind::App),
                    consumed_power_mah: row.get(3)?,
                    foreground_time_ms: row.get(4)?,
                    background_time_ms: row.get(5)?,
                    package_hint: row.get(6)?,
                    is_policy_hidden: row.get(7)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(consumers)
    }
}

impl SnapshotStore for SqliteStore {
    fn append(&self, snapshot: &DeviceSnapshot) -> Result<()> {
        // A snapshot lands as one header row plus its consumer rows; write
        // them in a single transaction.
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO snapshots (timestamp, zone_id, battery_level, total_power, discharge_percent)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                snapshot.timestamp_ms,
                snapshot.timezone_id,
                snapshot.battery_level_percent,
                snapshot.total_consumed_power_mah,
                snapshot.discharge_percent
            ],
        )?;

        for consumer in &snapshot.consumers {
            tx.execute(
                "INSERT INTO snapshot_consumers (timestamp, identity_key, raw_id, kind, consumed_power,
                     foreground_time_ms, background_time_ms, package_hint, is_hidden)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    snapshot.timestamp_ms,
                    consumer.identity_key,
                    consumer.raw_id,
                    consumer.kind.to_db(),
                    consumer.consumed_power_mah,
                    consumer.foreground_time_ms,
                    consumer.background_time_ms,
                    consumer.package_hint,
                    consumer.is_policy_hidden
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn load_window(&self, since_ms: i64) -> Result<Vec<DeviceSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, zone_id, battery_level, total_power, discharge_percent
             FROM snapshots
             WHERE timestamp >= ?1
             ORDER BY timestamp ASC",
        )?;

        let headers: Vec<(i64, String, u8, f64, i32)> = stmt
            .query_map(params![since_ms], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .filter_map(|r| r.ok())
            .collect();

        let mut snapshots = Vec::with_capacity(headers.len());
        for (timestamp_ms, timezone_id, battery_level_percent, total_power, discharge_percent) in
            headers
        {
            let consumers = self.load_consumers(timestamp_ms)?;
            snapshots.push(DeviceSnapshot {
                timestamp_ms,
                timezone_id,
                battery_level_percent,
                total_consumed_power_mah: total_power,
                discharge_percent,
                consumers,
            });
        }

        Ok(snapshots)
    }

    fn prune_older_than(&self, cutoff_ms: i64) -> Result<u64> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "DELETE FROM snapshot_consumers WHERE timestamp < ?1",
            params![cutoff_ms],
        )?;
        let deleted = tx.execute("DELETE FROM snapshots WHERE timestamp < ?1", params![cutoff_ms])?;

        tx.commit()?;
        Ok(deleted as u64)
    }

    fn snapshot_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))?;
        Ok(count)
    }
}
