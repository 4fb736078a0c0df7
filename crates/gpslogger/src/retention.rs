//! Retention policy for stored location records.
//!
//! A pure rule: records older than a fixed horizon are eligible for
//! deletion. The sweep itself lives in the store; the policy only decides
//! what "stale" means.

use chrono::{DateTime, Duration, Utc};

/// The default retention horizon in hours.
pub const DEFAULT_HORIZON_HOURS: u32 = 24;

/// The age beyond which a record is eligible for deletion.
///
/// Applied once at cold start; there is no periodic sweep, so records that
/// cross the horizon during a live session survive until the next startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    horizon: Duration,
}

impl RetentionPolicy {
    /// Create a policy with an explicit horizon.
    #[must_use]
    pub const fn new(horizon: Duration) -> Self {
        Self { horizon }
    }

    /// Create a policy with a horizon expressed in hours.
    #[must_use]
    pub fn from_hours(hours: u32) -> Self {
        Self::new(Duration::hours(i64::from(hours)))
    }

    /// The retention horizon.
    #[must_use]
    pub const fn horizon(&self) -> Duration {
        self.horizon
    }

    /// The cutoff instant: records created strictly before it are stale.
    #[must_use]
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.horizon
    }

    /// Check whether a record created at the given instant has expired.
    #[must_use]
    pub fn is_expired(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        created_at < self.cutoff(now)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from_hours(DEFAULT_HORIZON_HOURS)
    }
}
