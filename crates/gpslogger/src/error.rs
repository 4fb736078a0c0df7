//! Error types for gpslogger.
//!
//! This module defines all error types used throughout the gpslogger crate.
//! Every store operation is fallible; nothing is asserted away. The
//! controller uses [`Error::is_corruption`] to decide whether a failed
//! store call is retryable I/O (drop the update, keep going) or corruption
//! (escalate).

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for gpslogger operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Store Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query or mutation failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Position Source Errors ===
    /// A position source failed to start delivering updates.
    #[error("failed to start position source '{name}': {message}")]
    SourceStart {
        /// Name of the position source.
        name: &'static str,
        /// Description of what went wrong.
        message: String,
    },

    /// A position source failed to stop cleanly.
    #[error("failed to stop position source '{name}': {message}")]
    SourceStop {
        /// Name of the position source.
        name: &'static str,
        /// Description of what went wrong.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for gpslogger operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a position source start error.
    #[must_use]
    pub fn source_start(name: &'static str, message: impl Into<String>) -> Self {
        Self::SourceStart {
            name,
            message: message.into(),
        }
    }

    /// Create a position source stop error.
    #[must_use]
    pub fn source_stop(name: &'static str, message: impl Into<String>) -> Self {
        Self::SourceStop {
            name,
            message: message.into(),
        }
    }

    /// Check whether this error indicates on-disk corruption.
    ///
    /// Corruption is the only store failure worth escalating; everything
    /// else is treated as retryable and the affected update can be dropped.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        let sqlite_error = match self {
            Self::DatabaseQuery(rusqlite::Error::SqliteFailure(err, _)) => err,
            Self::DatabaseOpen {
                source: rusqlite::Error::SqliteFailure(err, _),
                ..
            } => err,
            _ => return false,
        };
        matches!(
            sqlite_error.code,
            rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase
        )
    }
}
