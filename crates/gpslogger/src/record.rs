//! Core record types for gpslogger.
//!
//! This module defines the location record persisted by the store and the
//! raw coordinate type delivered by position sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees, positive north.
    pub latitude: f64,
    /// Longitude in degrees, positive east.
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check that both components are finite and within geographic range.
    ///
    /// Mirrors the platform validity check applied to incoming readings:
    /// latitude in [-90, 90], longitude in [-180, 180].
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Check whether this coordinate counts as a real fix.
    ///
    /// The rule is "both components non-zero". (0, 0) is a legitimate
    /// coordinate near the equator and prime meridian, so this is a
    /// heuristic inherited from the capture workflow, not a geographic
    /// invariant. Readings without a fix are still stored; they just never
    /// render as pins.
    #[must_use]
    pub fn has_fix(&self) -> bool {
        self.latitude != 0.0 && self.longitude != 0.0
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// A timestamped location reading.
///
/// Records are immutable once stored: they are created when a position
/// source delivers a coordinate while capture is active, and destroyed
/// either by the retention sweep or by an explicit clear-all. Duplicate
/// coordinate/time pairs are permitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    /// Unique identifier for this record (assigned by the store).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Latitude in degrees.
    pub latitude: f64,

    /// Longitude in degrees.
    pub longitude: f64,

    /// When this reading was captured.
    pub created_at: DateTime<Utc>,
}

impl LocationRecord {
    /// Create a record from a coordinate, stamped with the current time.
    #[must_use]
    pub fn new(coordinate: Coordinate) -> Self {
        Self::with_timestamp(coordinate, Utc::now())
    }

    /// Create a record with an explicit capture time.
    #[must_use]
    pub fn with_timestamp(coordinate: Coordinate, created_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            created_at,
        }
    }

    /// Get the coordinate of this record.
    #[must_use]
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Check whether this record counts as a real fix.
    #[must_use]
    pub fn has_fix(&self) -> bool {
        self.coordinate().has_fix()
    }
}

impl Default for LocationRecord {
    /// The default record carries the epoch-adjacent sentinel timestamp
    /// (one second past the Unix epoch) used to distinguish "never set".
    fn default() -> Self {
        Self {
            id: None,
            latitude: 0.0,
            longitude: 0.0,
            created_at: DateTime::from_timestamp(1, 0).unwrap_or_default(),
        }
    }
}
