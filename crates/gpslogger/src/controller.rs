//! Capture controller.
//!
//! Owns the two-state capture workflow: purge stale records at cold start,
//! toggle position updates on and off, persist each accepted reading, and
//! push pins and list refreshes to the presentation boundary. All
//! collaborators are injected; there is no hidden store singleton.

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::position::{AuthorizationStatus, PositionEvent, PositionSource};
use crate::presenter::{Pin, Presenter};
use crate::record::{Coordinate, LocationRecord};
use crate::retention::RetentionPolicy;
use crate::store::{Store, StoreEvent};

/// Capacity of the position event channel.
const POSITION_CHANNEL_CAPACITY: usize = 32;

/// The two states of the capture workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    /// Not receiving position updates.
    #[default]
    Idle,
    /// Subscribed to position updates and persisting them.
    Capturing,
}

enum Next {
    Position(PositionEvent),
    StoreChanged,
    Closed,
}

/// The capture workflow controller.
///
/// Holds the store, a position source, and a presenter, and drives the
/// Idle/Capturing state machine. While Capturing it owns two single-owner
/// resources: the position event receiver and the store change
/// subscription. Both are released on the transition back to Idle, so
/// rapid toggling can never leave a stale subscription double-firing.
pub struct CaptureController<S, P> {
    store: Store,
    source: S,
    presenter: P,
    retention: RetentionPolicy,
    state: CaptureState,
    position_rx: Option<mpsc::Receiver<PositionEvent>>,
    store_rx: Option<broadcast::Receiver<StoreEvent>>,
}

impl<S, P> std::fmt::Debug for CaptureController<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureController")
            .field("state", &self.state)
            .field("store", &self.store.path())
            .finish()
    }
}

impl<S: PositionSource, P: Presenter> CaptureController<S, P> {
    /// Create a controller from its injected collaborators.
    pub fn new(store: Store, source: S, presenter: P, retention: RetentionPolicy) -> Self {
        Self {
            store,
            source,
            presenter,
            retention,
            state: CaptureState::Idle,
            position_rx: None,
            store_rx: None,
        }
    }

    /// The current capture state.
    #[must_use]
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Check whether capture is active.
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.state == CaptureState::Capturing
    }

    /// Read access to the underlying store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Cold-start sequence: purge stale records, then load the survivors
    /// and render them. Returns the number of records purged.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails.
    pub fn startup(&mut self) -> Result<usize> {
        let purged = self.purge_stale()?;
        let records = self.load_live_records()?;
        for record in &records {
            if let Some(pin) = Pin::for_record(record) {
                self.presenter.render_pin(pin);
            }
        }
        self.presenter.refresh_list(&records);
        Ok(purged)
    }

    /// Toggle between Idle and Capturing.
    ///
    /// The toggle is symmetric and can be exercised indefinitely; there is
    /// no terminal state.
    ///
    /// # Errors
    ///
    /// Returns an error if the position source fails to start.
    pub async fn toggle(&mut self) -> Result<CaptureState> {
        match self.state {
            CaptureState::Idle => {
                let (tx, rx) = mpsc::channel(POSITION_CHANNEL_CAPACITY);
                self.source.start_updates(tx).await?;
                // Release any stale subscription before taking a new one.
                self.store_rx = None;
                self.store_rx = Some(self.store.watch());
                self.position_rx = Some(rx);
                self.state = CaptureState::Capturing;
                info!(source = self.source.name(), "capture started");
            }
            CaptureState::Capturing => {
                // A source that already ran out of updates is fine; the
                // transition back to Idle must succeed regardless.
                if let Err(err) = self.source.stop_updates() {
                    debug!(%err, "position source was not running");
                }
                self.position_rx = None;
                self.store_rx = None;
                self.state = CaptureState::Idle;
                info!("capture stopped");
            }
        }
        Ok(self.state)
    }

    /// Dispatch one event from the position source.
    ///
    /// # Errors
    ///
    /// Returns an error only for store corruption; retryable store
    /// failures drop the affected update.
    pub fn handle_position_event(&mut self, event: PositionEvent) -> Result<()> {
        match event {
            PositionEvent::AuthorizationChanged(status) => {
                self.on_authorization_changed(status);
                Ok(())
            }
            PositionEvent::PositionBatch(batch) => self.on_position_update(&batch),
        }
    }

    fn on_authorization_changed(&mut self, status: AuthorizationStatus) {
        match status {
            AuthorizationStatus::Undetermined => {
                debug!("authorization undetermined, requesting strongest grant");
                self.source.request_authorization();
            }
            AuthorizationStatus::AuthorizedAlways => {
                self.presenter.follow_user();
            }
            other => {
                // Denied, restricted and when-in-use are silently ignored;
                // the toggle simply has no visible effect without updates.
                debug!(status = %other, "ignoring authorization change");
            }
        }
    }

    /// Accept the newest coordinate of a batch, persist it, and drop a pin.
    ///
    /// Earlier entries in the batch are discarded (at most one reading per
    /// event). Invalid coordinates are a silent no-op. The pin is rendered
    /// whether or not the write landed; there is no ordering promise
    /// between the visual drop and the commit.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store reports corruption.
    pub fn on_position_update(&mut self, batch: &[Coordinate]) -> Result<()> {
        let Some(coordinate) = batch.last().copied() else {
            return Ok(());
        };
        if !coordinate.is_valid() {
            debug!(%coordinate, "dropping invalid coordinate");
            return Ok(());
        }

        let record = LocationRecord::new(coordinate);
        match self.store.insert(&record) {
            Ok(id) => debug!(id, %coordinate, "stored location"),
            Err(err) if err.is_corruption() => return Err(err),
            Err(err) => warn!(%err, "dropping location update after store failure"),
        }

        if let Some(pin) = Pin::for_record(&record) {
            self.presenter.render_pin(pin);
        }
        Ok(())
    }

    /// Delete every record older than the retention horizon.
    ///
    /// Invoked once from [`startup`](Self::startup); there is no periodic
    /// sweep, so records aging past the horizon during a live session
    /// persist until the next cold start.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn purge_stale(&mut self) -> Result<usize> {
        let cutoff = self.retention.cutoff(Utc::now());
        self.store.delete_older_than(cutoff)
    }

    /// Delete every record, clear all pins, and refresh the list.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails.
    pub fn clear_all(&mut self) -> Result<()> {
        self.store.delete_all()?;
        let records = self.load_live_records()?;
        self.presenter.clear_pins();
        self.presenter.refresh_list(&records);
        Ok(())
    }

    /// Load the current record set, ordered by `created_at` descending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn load_live_records(&self) -> Result<Vec<LocationRecord>> {
        self.store.all_records()
    }

    fn refresh_presentation(&mut self) -> Result<()> {
        let records = self.load_live_records()?;
        self.presenter.refresh_list(&records);
        Ok(())
    }

    /// Await and process the next event while Capturing.
    ///
    /// Returns `Ok(false)` once the controller is idle or the position
    /// source has closed its channel, `Ok(true)` after handling an event.
    ///
    /// # Errors
    ///
    /// Returns an error if event handling hits an unrecoverable store
    /// failure.
    pub async fn step(&mut self) -> Result<bool> {
        if self.state != CaptureState::Capturing {
            return Ok(false);
        }
        let Some(mut position_rx) = self.position_rx.take() else {
            return Ok(false);
        };
        let Some(mut store_rx) = self.store_rx.take() else {
            self.position_rx = Some(position_rx);
            return Ok(false);
        };

        let next = tokio::select! {
            event = position_rx.recv() => event.map_or(Next::Closed, Next::Position),
            event = store_rx.recv() => match event {
                Ok(_) => Next::StoreChanged,
                // A lagged subscription still means the set changed.
                Err(broadcast::error::RecvError::Lagged(_)) => Next::StoreChanged,
                Err(broadcast::error::RecvError::Closed) => Next::Closed,
            },
        };

        self.position_rx = Some(position_rx);
        self.store_rx = Some(store_rx);

        match next {
            Next::Position(event) => {
                self.handle_position_event(event)?;
                Ok(true)
            }
            Next::StoreChanged => {
                self.refresh_presentation()?;
                Ok(true)
            }
            Next::Closed => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::SimulatedSource;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::time::Duration as StdDuration;

    /// Presenter double that records every call.
    #[derive(Debug, Default)]
    struct RecordingPresenter {
        pins: Vec<Pin>,
        clears: usize,
        list_lengths: Vec<usize>,
        follows: usize,
    }

    impl Presenter for RecordingPresenter {
        fn render_pin(&mut self, pin: Pin) {
            self.pins.push(pin);
        }

        fn clear_pins(&mut self) {
            self.pins.clear();
            self.clears += 1;
        }

        fn refresh_list(&mut self, records: &[LocationRecord]) {
            self.list_lengths.push(records.len());
        }

        fn follow_user(&mut self) {
            self.follows += 1;
        }
    }

    /// Position source double that records start/stop calls.
    #[derive(Debug, Default)]
    struct ScriptedSource {
        starts: usize,
        stops: usize,
        auth_requests: usize,
        running: bool,
    }

    #[async_trait]
    impl PositionSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn authorization(&self) -> AuthorizationStatus {
            AuthorizationStatus::AuthorizedAlways
        }

        fn request_authorization(&mut self) {
            self.auth_requests += 1;
        }

        async fn start_updates(&mut self, _tx: mpsc::Sender<PositionEvent>) -> Result<()> {
            self.starts += 1;
            self.running = true;
            Ok(())
        }

        fn stop_updates(&mut self) -> Result<()> {
            self.stops += 1;
            self.running = false;
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running
        }
    }

    fn test_controller() -> CaptureController<ScriptedSource, RecordingPresenter> {
        CaptureController::new(
            Store::open_in_memory().expect("in-memory store"),
            ScriptedSource::default(),
            RecordingPresenter::default(),
            RetentionPolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_toggle_is_symmetric() {
        let mut controller = test_controller();
        assert_eq!(controller.state(), CaptureState::Idle);

        assert_eq!(controller.toggle().await.unwrap(), CaptureState::Capturing);
        assert!(controller.source.is_running());

        assert_eq!(controller.toggle().await.unwrap(), CaptureState::Idle);
        assert!(!controller.source.is_running());

        assert_eq!(controller.toggle().await.unwrap(), CaptureState::Capturing);
        assert_eq!(controller.source.starts, 2);
        assert_eq!(controller.source.stops, 1);
    }

    #[tokio::test]
    async fn test_double_toggle_leaves_one_subscription() {
        let mut controller = test_controller();

        for _ in 0..2 {
            controller.toggle().await.unwrap();
            assert_eq!(controller.store.watcher_count(), 1);
            controller.toggle().await.unwrap();
            assert_eq!(controller.store.watcher_count(), 0);
        }
    }

    #[test]
    fn test_position_update_stores_and_renders() {
        let mut controller = test_controller();

        controller
            .on_position_update(&[Coordinate::new(35.0, 139.0)])
            .unwrap();

        let records = controller.load_live_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].latitude, 35.0);
        assert_eq!(records[0].longitude, 139.0);
        assert_eq!(controller.presenter.pins.len(), 1);
        assert_eq!(controller.presenter.pins[0].title, "35,139");
    }

    #[test]
    fn test_position_update_uses_last_of_batch() {
        let mut controller = test_controller();

        controller
            .on_position_update(&[
                Coordinate::new(10.0, 10.0),
                Coordinate::new(20.0, 20.0),
                Coordinate::new(35.0, 139.0),
            ])
            .unwrap();

        let records = controller.load_live_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].latitude, 35.0);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut controller = test_controller();
        controller.on_position_update(&[]).unwrap();
        assert!(controller.load_live_records().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_coordinate_is_dropped() {
        let mut controller = test_controller();

        controller
            .on_position_update(&[Coordinate::new(95.0, 139.0)])
            .unwrap();
        controller
            .on_position_update(&[Coordinate::new(f64::NAN, 0.0)])
            .unwrap();

        assert!(controller.load_live_records().unwrap().is_empty());
        assert!(controller.presenter.pins.is_empty());
    }

    #[test]
    fn test_zero_zero_is_stored_but_not_rendered() {
        let mut controller = test_controller();

        controller
            .on_position_update(&[Coordinate::new(35.0, 139.0)])
            .unwrap();
        controller
            .on_position_update(&[Coordinate::new(0.0, 0.0)])
            .unwrap();

        // Two records in the live view, exactly one pin rendered.
        assert_eq!(controller.load_live_records().unwrap().len(), 2);
        assert_eq!(controller.presenter.pins.len(), 1);
    }

    #[test]
    fn test_authorization_undetermined_requests_grant() {
        let mut controller = test_controller();
        controller
            .handle_position_event(PositionEvent::AuthorizationChanged(
                AuthorizationStatus::Undetermined,
            ))
            .unwrap();
        assert_eq!(controller.source.auth_requests, 1);
    }

    #[test]
    fn test_authorization_always_follows_user() {
        let mut controller = test_controller();
        controller
            .handle_position_event(PositionEvent::AuthorizationChanged(
                AuthorizationStatus::AuthorizedAlways,
            ))
            .unwrap();
        assert_eq!(controller.presenter.follows, 1);
    }

    #[test]
    fn test_authorization_denied_is_ignored() {
        let mut controller = test_controller();
        for status in [
            AuthorizationStatus::Denied,
            AuthorizationStatus::Restricted,
            AuthorizationStatus::AuthorizedWhenInUse,
        ] {
            controller
                .handle_position_event(PositionEvent::AuthorizationChanged(status))
                .unwrap();
        }
        assert_eq!(controller.source.auth_requests, 0);
        assert_eq!(controller.presenter.follows, 0);
    }

    #[test]
    fn test_startup_purges_and_renders_survivors() {
        let mut controller = test_controller();
        let now = Utc::now();

        let stale = LocationRecord::with_timestamp(
            Coordinate::new(1.0, 1.0),
            now - Duration::hours(25),
        );
        let fresh = LocationRecord::with_timestamp(
            Coordinate::new(35.0, 139.0),
            now - Duration::hours(1),
        );
        let no_fix =
            LocationRecord::with_timestamp(Coordinate::new(0.0, 0.0), now - Duration::hours(2));
        controller.store.insert(&stale).unwrap();
        controller.store.insert(&fresh).unwrap();
        controller.store.insert(&no_fix).unwrap();

        let purged = controller.startup().unwrap();

        assert_eq!(purged, 1);
        // Two survivors in the list, one pin (the zero/zero record has no fix).
        assert_eq!(controller.presenter.list_lengths, vec![2]);
        assert_eq!(controller.presenter.pins.len(), 1);
    }

    #[test]
    fn test_clear_all_empties_view_and_pins() {
        let mut controller = test_controller();
        controller
            .on_position_update(&[Coordinate::new(35.0, 139.0)])
            .unwrap();
        assert_eq!(controller.presenter.pins.len(), 1);

        controller.clear_all().unwrap();

        assert!(controller.load_live_records().unwrap().is_empty());
        assert!(controller.presenter.pins.is_empty());
        assert_eq!(controller.presenter.clears, 1);
        assert_eq!(controller.presenter.list_lengths.last(), Some(&0));
    }

    #[test]
    fn test_live_view_ordering() {
        let mut controller = test_controller();
        let now = Utc::now();

        for hours in [3, 1, 2] {
            let record = LocationRecord::with_timestamp(
                Coordinate::new(f64::from(hours), f64::from(hours)),
                now - Duration::hours(i64::from(hours)),
            );
            controller.store.insert(&record).unwrap();
        }

        let records = controller.load_live_records().unwrap();
        let latitudes: Vec<f64> = records.iter().map(|r| r.latitude).collect();
        assert_eq!(latitudes, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_single_record_scenario() {
        let mut controller = test_controller();

        controller
            .on_position_update(&[Coordinate::new(35.0, 139.0)])
            .unwrap();

        let records = controller.load_live_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].latitude, 35.0);
        assert_eq!(records[0].longitude, 139.0);
        assert!(records[0].created_at <= Utc::now());
    }

    #[tokio::test]
    async fn test_step_returns_false_when_idle() {
        let mut controller = test_controller();
        assert!(!controller.step().await.unwrap());
    }

    #[tokio::test]
    async fn test_full_session_with_simulated_source() {
        let source = SimulatedSource::new(Coordinate::new(35.0, 139.0))
            .with_points(5)
            .with_interval(StdDuration::from_millis(5));
        let mut controller = CaptureController::new(
            Store::open_in_memory().expect("in-memory store"),
            source,
            RecordingPresenter::default(),
            RetentionPolicy::default(),
        );

        controller.startup().unwrap();
        controller.toggle().await.unwrap();
        while controller.step().await.unwrap() {}
        controller.toggle().await.unwrap();

        let records = controller.load_live_records().unwrap();
        assert_eq!(records.len(), 5);
        // Each stored reading came with a fix near the origin, so each
        // dropped a pin, and every insert triggered a list refresh.
        assert_eq!(controller.presenter.pins.len(), 5);
        assert!(controller.presenter.follows >= 1);
        assert!(controller.presenter.list_lengths.len() > 1);
        assert_eq!(controller.store().watcher_count(), 0);
    }
}
