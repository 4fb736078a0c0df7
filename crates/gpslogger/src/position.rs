//! Position source boundary.
//!
//! This module defines the trait a platform location service must fulfill
//! to feed the capture controller, together with the authorization states
//! such a service reports and a deterministic simulated implementation
//! used by the CLI and tests.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::record::Coordinate;

/// Authorization state of a position source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    /// The user has not yet been asked.
    Undetermined,
    /// The user declined access.
    Denied,
    /// Access is restricted by policy.
    Restricted,
    /// Updates are allowed while the application is in use.
    AuthorizedWhenInUse,
    /// Updates are always allowed.
    AuthorizedAlways,
}

impl std::fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undetermined => write!(f, "undetermined"),
            Self::Denied => write!(f, "denied"),
            Self::Restricted => write!(f, "restricted"),
            Self::AuthorizedWhenInUse => write!(f, "authorized-when-in-use"),
            Self::AuthorizedAlways => write!(f, "authorized-always"),
        }
    }
}

impl AuthorizationStatus {
    fn as_u8(self) -> u8 {
        match self {
            Self::Undetermined => 0,
            Self::Denied => 1,
            Self::Restricted => 2,
            Self::AuthorizedWhenInUse => 3,
            Self::AuthorizedAlways => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Denied,
            2 => Self::Restricted,
            3 => Self::AuthorizedWhenInUse,
            4 => Self::AuthorizedAlways,
            _ => Self::Undetermined,
        }
    }
}

/// An event delivered by a position source.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionEvent {
    /// The authorization state changed.
    AuthorizationChanged(AuthorizationStatus),
    /// A batch of coordinate readings, oldest first. Consumers are
    /// expected to act on the newest entry only.
    PositionBatch(Vec<Coordinate>),
}

/// Desired accuracy tiers, mirroring platform location services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    /// The best fix the hardware can provide.
    #[default]
    Best,
    /// Accurate to roughly ten meters.
    NearestTenMeters,
    /// Accurate to roughly a hundred meters.
    HundredMeters,
    /// Accurate to roughly a kilometer.
    Kilometer,
}

impl Accuracy {
    /// Measurement noise radius in meters for the simulated source.
    #[must_use]
    pub fn jitter_meters(self) -> f64 {
        match self {
            Self::Best => 3.0,
            Self::NearestTenMeters => 10.0,
            Self::HundredMeters => 100.0,
            Self::Kilometer => 1000.0,
        }
    }
}

/// A trait for platform-specific position sources.
///
/// Implementors deliver [`PositionEvent`]s through the channel handed to
/// [`start_updates`](PositionSource::start_updates) until stopped or
/// exhausted, at which point the channel closes.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// The name of this source (for logging and error context).
    fn name(&self) -> &'static str;

    /// The current authorization state.
    fn authorization(&self) -> AuthorizationStatus;

    /// Request the strongest location-permission grant available.
    ///
    /// Side effect only; an eventual state change is reported through
    /// [`PositionEvent::AuthorizationChanged`].
    fn request_authorization(&mut self);

    /// Start delivering events through the given channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is already running or fails to start.
    async fn start_updates(&mut self, tx: mpsc::Sender<PositionEvent>) -> Result<()>;

    /// Stop delivering events.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is not running.
    fn stop_updates(&mut self) -> Result<()>;

    /// Check whether the source is currently delivering events.
    fn is_running(&self) -> bool;
}

/// Meters per degree of latitude, good enough for small simulated walks.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// A deterministic-shape random walk around an origin coordinate.
///
/// On start it reports its authorization state, grants the strongest
/// permission when asked, then emits a fixed number of position batches at
/// a fixed interval before closing the channel. Each step moves at least
/// the configured distance filter, the way a real source would suppress
/// sub-filter movement.
pub struct SimulatedSource {
    origin: Coordinate,
    points: usize,
    interval: Duration,
    distance_filter_meters: f64,
    accuracy: Accuracy,
    authorization: Arc<AtomicU8>,
    running: Arc<AtomicBool>,
}

impl std::fmt::Debug for SimulatedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedSource")
            .field("origin", &self.origin)
            .field("points", &self.points)
            .field("interval", &self.interval)
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish()
    }
}

impl SimulatedSource {
    /// Create a simulated source walking away from the given origin.
    #[must_use]
    pub fn new(origin: Coordinate) -> Self {
        Self {
            origin,
            points: 10,
            interval: Duration::from_millis(500),
            distance_filter_meters: 100.0,
            accuracy: Accuracy::Best,
            authorization: Arc::new(AtomicU8::new(AuthorizationStatus::Undetermined.as_u8())),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the number of position batches to emit.
    #[must_use]
    pub fn with_points(mut self, points: usize) -> Self {
        self.points = points;
        self
    }

    /// Set the interval between batches.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the minimum movement per emitted batch.
    #[must_use]
    pub fn with_distance_filter(mut self, meters: f64) -> Self {
        self.distance_filter_meters = meters;
        self
    }

    /// Set the simulated measurement accuracy.
    #[must_use]
    pub fn with_accuracy(mut self, accuracy: Accuracy) -> Self {
        self.accuracy = accuracy;
        self
    }

    /// One random-walk step of at least `min_meters` from `from`.
    fn step_from(from: Coordinate, min_meters: f64, jitter_meters: f64) -> Coordinate {
        use rand::Rng;

        let mut rng = rand::rng();
        let bearing = rng.random_range(0.0..std::f64::consts::TAU);
        let distance = min_meters.max(1.0) * rng.random_range(1.0..1.6);
        let noise = rng.random_range(0.0..=jitter_meters);

        let north = bearing.cos() * distance + rng.random_range(-1.0..1.0) * noise;
        let east = bearing.sin() * distance + rng.random_range(-1.0..1.0) * noise;

        let latitude = from.latitude + north / METERS_PER_DEGREE;
        let longitude =
            from.longitude + east / (METERS_PER_DEGREE * from.latitude.to_radians().cos().max(0.01));
        Coordinate::new(latitude, longitude)
    }
}

#[async_trait]
impl PositionSource for SimulatedSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn authorization(&self) -> AuthorizationStatus {
        AuthorizationStatus::from_u8(self.authorization.load(Ordering::SeqCst))
    }

    fn request_authorization(&mut self) {
        // The simulator always grants the strongest permission.
        debug!("simulated source granting authorized-always");
        self.authorization.store(
            AuthorizationStatus::AuthorizedAlways.as_u8(),
            Ordering::SeqCst,
        );
    }

    async fn start_updates(&mut self, tx: mpsc::Sender<PositionEvent>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::source_start(self.name(), "already running"));
        }

        let origin = self.origin;
        let points = self.points;
        let interval = self.interval;
        let filter = self.distance_filter_meters;
        let jitter = self.accuracy.jitter_meters();
        let authorization = Arc::clone(&self.authorization);
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            let initial = AuthorizationStatus::from_u8(authorization.load(Ordering::SeqCst));
            if tx
                .send(PositionEvent::AuthorizationChanged(initial))
                .await
                .is_err()
            {
                running.store(false, Ordering::SeqCst);
                return;
            }

            // Give the consumer a few intervals to react to an
            // undetermined state, then report the grant if one arrived.
            if initial == AuthorizationStatus::Undetermined {
                for _ in 0..5 {
                    tokio::time::sleep(interval).await;
                    let current =
                        AuthorizationStatus::from_u8(authorization.load(Ordering::SeqCst));
                    if current == initial {
                        continue;
                    }
                    if tx
                        .send(PositionEvent::AuthorizationChanged(current))
                        .await
                        .is_err()
                    {
                        running.store(false, Ordering::SeqCst);
                        return;
                    }
                    break;
                }
            }

            let mut position = origin;
            for i in 0..points {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                tokio::time::sleep(interval).await;

                let next = Self::step_from(position, filter, jitter);
                // Every third batch carries an intermediate reading too;
                // consumers must act on the newest entry only.
                let batch = if i % 3 == 2 {
                    let midpoint = Coordinate::new(
                        (position.latitude + next.latitude) / 2.0,
                        (position.longitude + next.longitude) / 2.0,
                    );
                    vec![midpoint, next]
                } else {
                    vec![next]
                };
                position = next;

                if tx.send(PositionEvent::PositionBatch(batch)).await.is_err() {
                    break;
                }
            }

            running.store(false, Ordering::SeqCst);
            debug!("simulated source finished");
        });

        Ok(())
    }

    fn stop_updates(&mut self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(Error::source_stop(self.name(), "not running"));
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
