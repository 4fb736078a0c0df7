//! Location record store for gpslogger.
//!
//! This module provides `SQLite`-based persistent storage for location
//! records. Every mutation runs inside an explicit transaction, and each
//! committed mutation is published on a change-notification channel so
//! presentation layers can refresh without polling. The "live view" of the
//! original design is realized as snapshot queries plus that explicit
//! subscription, not framework auto-refresh.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::record::LocationRecord;

/// Capacity of the change-notification channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A committed mutation of the record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    /// A record was inserted.
    Inserted {
        /// The id assigned to the new record.
        id: i64,
    },
    /// The retention sweep deleted stale records.
    Purged {
        /// Number of records deleted.
        deleted: usize,
    },
    /// Every record was deleted.
    Cleared {
        /// Number of records deleted.
        deleted: usize,
    },
}

/// Storage engine for location records.
///
/// Owns the persisted record set exclusively. Callers hold query snapshots
/// and a change subscription; they never reach into the connection.
#[derive(Debug)]
pub struct Store {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
    /// Change-notification channel; mutations publish after commit.
    events: broadcast::Sender<StoreEvent>,
}

impl Store {
    /// Open or create a store database at the given path.
    ///
    /// Creates the parent directories and database file if they don't
    /// exist, and initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema
    /// initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL keeps readers responsive while a write transaction is open
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        migrations::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self::from_connection(path, conn))
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self::from_connection(PathBuf::from(":memory:"), conn))
    }

    fn from_connection(path: PathBuf, conn: Connection) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { path, conn, events }
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Subscribe to change notifications.
    ///
    /// The subscription is released by dropping the receiver; the store
    /// itself never tracks individual subscribers.
    #[must_use]
    pub fn watch(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Number of live change subscriptions.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is the normal idle case, not an error.
        let _ = self.events.send(event);
    }

    /// Insert a location record.
    ///
    /// Returns the assigned id. Duplicates are permitted; nothing is
    /// deduplicated.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub fn insert(&mut self, record: &LocationRecord) -> Result<i64> {
        let tx = self.conn.transaction()?;
        tx.execute(
            r"
            INSERT INTO locations (latitude, longitude, created_at)
            VALUES (?1, ?2, ?3)
            ",
            params![
                record.latitude,
                record.longitude,
                record.created_at.to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        debug!("Inserted location record with id {}", id);
        self.publish(StoreEvent::Inserted { id });
        Ok(id)
    }

    /// Get a record by its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: i64) -> Result<Option<LocationRecord>> {
        let result = self
            .conn
            .query_row(
                r"
                SELECT id, latitude, longitude, created_at
                FROM locations WHERE id = ?1
                ",
                [id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(result)
    }

    /// Get all records, ordered by `created_at` descending.
    ///
    /// This is the snapshot behind the controller's live view; the change
    /// subscription signals when it needs re-issuing.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all_records(&self) -> Result<Vec<LocationRecord>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, latitude, longitude, created_at
            FROM locations ORDER BY created_at DESC, id DESC
            ",
        )?;

        let records = stmt
            .query_map([], Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Get the most recent records, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn recent(&self, limit: usize) -> Result<Vec<LocationRecord>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, latitude, longitude, created_at
            FROM locations ORDER BY created_at DESC, id DESC LIMIT ?1
            ",
        )?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = stmt
            .query_map([limit_i64], Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Count total records in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM locations", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete records created strictly before the cutoff instant.
    ///
    /// Returns the number of records deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM locations WHERE created_at < ?1",
            [cutoff.to_rfc3339()],
        )?;
        tx.commit()?;

        if deleted > 0 {
            info!("Purged {} stale location records", deleted);
            self.publish(StoreEvent::Purged { deleted });
        }
        Ok(deleted)
    }

    /// Delete every record unconditionally.
    ///
    /// Returns the number of records deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub fn delete_all(&mut self) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let deleted = tx.execute("DELETE FROM locations", [])?;
        tx.commit()?;

        info!("Cleared {} location records", deleted);
        self.publish(StoreEvent::Cleared { deleted });
        Ok(deleted)
    }

    /// Get store statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn stats(&self) -> Result<StoreStats> {
        let total_records = self.count()?;

        let oldest: Option<String> = self
            .conn
            .query_row(
                "SELECT created_at FROM locations ORDER BY created_at ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let newest: Option<String> = self
            .conn
            .query_row(
                "SELECT created_at FROM locations ORDER BY created_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let oldest_record = oldest.as_deref().and_then(parse_timestamp);
        let newest_record = newest.as_deref().and_then(parse_timestamp);

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StoreStats {
            total_records,
            oldest_record,
            newest_record,
            db_size_bytes,
        })
    }

    /// Convert a database row to a `LocationRecord`.
    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<LocationRecord> {
        let id: i64 = row.get(0)?;
        let latitude: f64 = row.get(1)?;
        let longitude: f64 = row.get(2)?;
        let created_at_str: String = row.get(3)?;

        // Unparseable timestamps fall back to the epoch sentinel rather
        // than failing the whole query.
        let created_at = parse_timestamp(&created_at_str)
            .unwrap_or_else(|| LocationRecord::default().created_at);

        Ok(LocationRecord {
            id: Some(id),
            latitude,
            longitude,
            created_at,
        })
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Statistics about the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Total number of records stored.
    pub total_records: i64,
    /// Timestamp of the oldest record.
    pub oldest_record: Option<DateTime<Utc>>,
    /// Timestamp of the newest record.
    pub newest_record: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Coordinate;
    use chrono::Duration;

    fn create_test_store() -> Store {
        Store::open_in_memory().expect("failed to create test store")
    }

    fn record_at(latitude: f64, longitude: f64) -> LocationRecord {
        LocationRecord::new(Coordinate::new(latitude, longitude))
    }

    #[test]
    fn test_open_in_memory() {
        assert!(Store::open_in_memory().is_ok());
    }

    #[test]
    fn test_insert_and_get() {
        let mut store = create_test_store();
        let record = record_at(35.0, 139.0);

        let id = store.insert(&record).unwrap();
        let retrieved = store.get(id).unwrap().expect("record should exist");

        assert_eq!(retrieved.id, Some(id));
        assert_eq!(retrieved.latitude, 35.0);
        assert_eq!(retrieved.longitude, 139.0);
        assert_eq!(
            retrieved.created_at.timestamp_micros(),
            record.created_at.timestamp_micros()
        );
    }

    #[test]
    fn test_get_nonexistent() {
        let store = create_test_store();
        assert!(store.get(99999).unwrap().is_none());
    }

    #[test]
    fn test_duplicates_permitted() {
        let mut store = create_test_store();
        let record = record_at(35.0, 139.0);

        let id1 = store.insert(&record).unwrap();
        let id2 = store.insert(&record).unwrap();

        assert_ne!(id1, id2);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_all_records_ordered_descending() {
        let mut store = create_test_store();
        let now = Utc::now();

        // Inserted out of order on purpose: [t-3, t-1, t-2].
        for hours in [3, 1, 2] {
            let record = LocationRecord::with_timestamp(
                Coordinate::new(35.0, 139.0),
                now - Duration::hours(hours),
            );
            store.insert(&record).unwrap();
        }

        let records = store.all_records().unwrap();
        let ages: Vec<i64> = records
            .iter()
            .map(|r| (now - r.created_at).num_hours())
            .collect();
        assert_eq!(ages, vec![1, 2, 3]);
    }

    #[test]
    fn test_recent_limit() {
        let mut store = create_test_store();
        for i in 0..5 {
            let record = LocationRecord::with_timestamp(
                Coordinate::new(35.0, 139.0),
                Utc::now() - Duration::minutes(i),
            );
            store.insert(&record).unwrap();
        }

        assert_eq!(store.recent(3).unwrap().len(), 3);
        assert_eq!(store.recent(0).unwrap().len(), 0);
    }

    #[test]
    fn test_delete_older_than_boundary() {
        let mut store = create_test_store();
        let now = Utc::now();

        let stale = LocationRecord::with_timestamp(
            Coordinate::new(1.0, 1.0),
            now - Duration::hours(25),
        );
        let fresh = LocationRecord::with_timestamp(
            Coordinate::new(2.0, 2.0),
            now - Duration::hours(23),
        );
        store.insert(&stale).unwrap();
        let fresh_id = store.insert(&fresh).unwrap();

        let deleted = store.delete_older_than(now - Duration::hours(24)).unwrap();
        assert_eq!(deleted, 1);

        let remaining = store.all_records().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, Some(fresh_id));
    }

    #[test]
    fn test_delete_all() {
        let mut store = create_test_store();
        store.insert(&record_at(1.0, 1.0)).unwrap();
        store.insert(&record_at(2.0, 2.0)).unwrap();

        let deleted = store.delete_all().unwrap();
        assert_eq!(deleted, 2);
        assert!(store.all_records().unwrap().is_empty());
    }

    #[test]
    fn test_watch_receives_insert_events() {
        let mut store = create_test_store();
        let mut rx = store.watch();

        let id = store.insert(&record_at(35.0, 139.0)).unwrap();

        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Inserted { id });
    }

    #[test]
    fn test_watch_receives_purge_and_clear_events() {
        let mut store = create_test_store();
        let old = LocationRecord::with_timestamp(
            Coordinate::new(1.0, 1.0),
            Utc::now() - Duration::hours(48),
        );
        store.insert(&old).unwrap();
        store.insert(&record_at(2.0, 2.0)).unwrap();

        let mut rx = store.watch();
        store
            .delete_older_than(Utc::now() - Duration::hours(24))
            .unwrap();
        store.delete_all().unwrap();

        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Purged { deleted: 1 });
        assert_eq!(rx.try_recv().unwrap(), StoreEvent::Cleared { deleted: 1 });
    }

    #[test]
    fn test_purge_without_deletions_publishes_nothing() {
        let mut store = create_test_store();
        store.insert(&record_at(35.0, 139.0)).unwrap();

        let mut rx = store.watch();
        let deleted = store
            .delete_older_than(Utc::now() - Duration::hours(24))
            .unwrap();

        assert_eq!(deleted, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_watcher_count_tracks_receivers() {
        let store = create_test_store();
        assert_eq!(store.watcher_count(), 0);

        let rx = store.watch();
        assert_eq!(store.watcher_count(), 1);

        drop(rx);
        assert_eq!(store.watcher_count(), 0);
    }

    #[test]
    fn test_stats_empty() {
        let store = create_test_store();
        let stats = store.stats().unwrap();

        assert_eq!(stats.total_records, 0);
        assert!(stats.oldest_record.is_none());
        assert!(stats.newest_record.is_none());
    }

    #[test]
    fn test_stats_with_data() {
        let mut store = create_test_store();
        let now = Utc::now();
        store
            .insert(&LocationRecord::with_timestamp(
                Coordinate::new(1.0, 1.0),
                now - Duration::hours(2),
            ))
            .unwrap();
        store
            .insert(&LocationRecord::with_timestamp(
                Coordinate::new(2.0, 2.0),
                now,
            ))
            .unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_records, 2);
        assert!(stats.oldest_record.unwrap() < stats.newest_record.unwrap());
    }

    #[test]
    fn test_zero_zero_coordinate_is_stored() {
        let mut store = create_test_store();
        store.insert(&record_at(0.0, 0.0)).unwrap();

        let records = store.all_records().unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].has_fix());
    }

    #[test]
    fn test_open_file_based_creates_parent_dirs() {
        let base = std::env::temp_dir().join(format!("gpslogger_test_{}", std::process::id()));
        let db_path = base.join("nested").join("locations.db");

        let mut store = Store::open(&db_path).unwrap();
        store.insert(&record_at(35.0, 139.0)).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.path(), db_path);

        let stats = store.stats().unwrap();
        assert!(stats.db_size_bytes > 0);

        drop(store);
        let _ = std::fs::remove_dir_all(&base);
    }
}
