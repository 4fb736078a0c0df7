//! Presentation boundary.
//!
//! The capture controller never reads UI state; it only pushes pins and
//! list refreshes through this trait. A console implementation backs the
//! CLI; anything richer (map, table) lives outside this crate.

use crate::record::{Coordinate, LocationRecord};

/// A map pin derived from a stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct Pin {
    /// Where the pin sits.
    pub coordinate: Coordinate,
    /// Pin title, "latitude,longitude".
    pub title: String,
    /// Pin subtitle, the capture timestamp.
    pub subtitle: String,
}

impl Pin {
    /// Build the pin for a record, or `None` if the record has no fix.
    ///
    /// Records at (0, 0) or on either zero axis are stored but never
    /// rendered; see [`Coordinate::has_fix`] for the caveat.
    #[must_use]
    pub fn for_record(record: &LocationRecord) -> Option<Self> {
        if !record.has_fix() {
            return None;
        }
        let coordinate = record.coordinate();
        Some(Self {
            title: coordinate.to_string(),
            subtitle: record.created_at.to_rfc3339(),
            coordinate,
        })
    }
}

/// The surface the controller renders to whenever the record set changes.
pub trait Presenter: Send {
    /// Drop a pin on the map surface.
    fn render_pin(&mut self, pin: Pin);

    /// Remove every rendered pin.
    fn clear_pins(&mut self);

    /// Re-render the list surface from the given ordered records.
    fn refresh_list(&mut self, records: &[LocationRecord]);

    /// Center on the user and follow with heading.
    fn follow_user(&mut self);
}

/// Presenter that prints to stdout, used by the `gpslog track` session.
#[derive(Debug, Default)]
pub struct ConsolePresenter {
    pins: usize,
}

impl Presenter for ConsolePresenter {
    fn render_pin(&mut self, pin: Pin) {
        self.pins += 1;
        println!("pin {:>3}  {}  ({})", self.pins, pin.title, pin.subtitle);
    }

    fn clear_pins(&mut self) {
        if self.pins > 0 {
            println!("cleared {} pins", self.pins);
        }
        self.pins = 0;
    }

    fn refresh_list(&mut self, records: &[LocationRecord]) {
        println!("history: {} records", records.len());
    }

    fn follow_user(&mut self) {
        println!("following user position");
    }
}
