//! `SQLite` schema definitions for gpslogger.
//!
//! This module contains the SQL statements for creating and managing
//! the database schema.

/// SQL statement to create the locations table.
///
/// There is deliberately no uniqueness constraint: duplicate
/// coordinate/time pairs are permitted.
pub const CREATE_LOCATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS locations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create an index on `created_at` for ordered queries
/// and the retention sweep.
pub const CREATE_CREATED_AT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_locations_created_at ON locations(created_at DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_LOCATIONS_TABLE,
    CREATE_CREATED_AT_INDEX,
    CREATE_METADATA_TABLE,
];
