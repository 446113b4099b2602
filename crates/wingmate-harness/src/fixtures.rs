//! Shared test fixtures for scenario tests.

use std::sync::Mutex;

use wingmate_client::SimDataProvider;
use wingmate_proto::AircraftPosition;

/// A [`SimDataProvider`] that always reports a fixed own-aircraft position
/// and records whatever peer positions it is handed.
pub struct FixedPositionSim {
    position: Mutex<AircraftPosition>,
    pushed: Mutex<Vec<(u8, AircraftPosition)>>,
}

impl FixedPositionSim {
    /// Create a fixture reporting `position` as the user's own aircraft.
    #[must_use]
    pub fn new(position: AircraftPosition) -> Self {
        Self { position: Mutex::new(position), pushed: Mutex::new(Vec::new()) }
    }

    /// Every `(slot, position)` pair pushed by the client link so far.
    #[must_use]
    pub fn pushed(&self) -> Vec<(u8, AircraftPosition)> {
        self.pushed.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

impl SimDataProvider for FixedPositionSim {
    fn user_aircraft_position(&self) -> AircraftPosition {
        *self.position.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set_other_aircraft_position(&self, slot: u8, pos: AircraftPosition) {
        self.pushed.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push((slot, pos));
    }
}

/// A representative aircraft position, matching S1's literal inputs.
#[must_use]
pub fn alice_position() -> AircraftPosition {
    AircraftPosition {
        timestamp_ms: 0,
        latitude: 37.0,
        longitude: -122.0,
        altitude: 1000.0,
        heading: 90.0,
        pitch: 0.0,
        roll: 0.0,
        rudder: 0.0,
        elevator: 0.0,
        aileron: 0.0,
        speedbrake: 0.0,
        flaps: 0.0,
        gear: false,
        beacon: true,
        strobe: false,
        navlight: true,
        taxilight: false,
        landlight: false,
    }
}
