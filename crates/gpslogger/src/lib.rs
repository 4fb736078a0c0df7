//! `gpslogger` - location capture and retention engine
//!
//! This library records geographic positions delivered by a position
//! source, persists them to an embedded `SQLite` store, applies a fixed
//! retention horizon at cold start, and pushes pins and list refreshes to
//! a pluggable presentation boundary.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod position;
pub mod presenter;
pub mod record;
pub mod retention;
pub mod store;

pub use config::Config;
pub use controller::{CaptureController, CaptureState};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use position::{AuthorizationStatus, PositionEvent, PositionSource, SimulatedSource};
pub use presenter::{ConsolePresenter, Pin, Presenter};
pub use record::{Coordinate, LocationRecord};
pub use retention::RetentionPolicy;
pub use store::{Store, StoreEvent, StoreStats};
