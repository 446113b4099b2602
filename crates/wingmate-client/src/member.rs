//! `TrackedAircraft`: the client's per-peer catalog entry (§3, §4.6).

use wingmate_core::Member;
use wingmate_proto::{AircraftPosition, IdentityStrings};

use crate::predictor::PredictorState;

/// A peer aircraft known to this client: its identity, the smoothing
/// predictor tracking its reported motion, and the catalog bookkeeping
/// shared with [`wingmate_core::MembershipCatalog`].
#[derive(Debug, Clone)]
pub struct TrackedAircraft {
    uuid: u32,
    slot_id: Option<u8>,
    name: Option<String>,
    callsign: Option<String>,
    predictor: PredictorState,
    distance_km: f64,
    stale_counter: u32,
    reap_counter: u32,
}

impl TrackedAircraft {
    /// Create an untracked entry for `uuid`, before its first sample.
    #[must_use]
    pub fn new(uuid: u32) -> Self {
        Self {
            uuid,
            slot_id: None,
            name: None,
            callsign: None,
            predictor: PredictorState::new(),
            distance_km: 0.0,
            stale_counter: 0,
            reap_counter: 0,
        }
    }

    /// Ingest one WORLDSTATE sample for this aircraft (§4.6.3), resetting
    /// the stale counter.
    pub fn update_tracking(&mut self, position: AircraftPosition, rcv_ts_ms: u32, user_lat: f64, user_lon: f64) {
        self.distance_km = self.predictor.update_tracking(position, rcv_ts_ms, user_lat, user_lon);
        self.stale_counter = 0;
    }

    /// The instantaneous predicted state at `now_ms`, for the simulator layer.
    pub fn get_prediction(&mut self, now_ms: u32) -> AircraftPosition {
        self.predictor.get_prediction(now_ms)
    }

    /// Great-circle distance in km from this aircraft to the user aircraft,
    /// as of the last ingested sample.
    #[must_use]
    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    /// Adopt a (re)announced identity.
    pub fn set_identity(&mut self, identity: IdentityStrings) {
        self.name = Some(identity.name);
        self.callsign = Some(identity.callsign);
    }

    /// This aircraft's name/callsign, empty strings if never announced.
    #[must_use]
    pub fn identity(&self) -> IdentityStrings {
        IdentityStrings {
            name: self.name.clone().unwrap_or_default(),
            callsign: self.callsign.clone().unwrap_or_default(),
        }
    }
}

impl Member for TrackedAircraft {
    fn uuid(&self) -> u32 {
        self.uuid
    }

    fn slot_id(&self) -> Option<u8> {
        self.slot_id
    }

    fn set_slot_id(&mut self, slot: u8) {
        self.slot_id = Some(slot);
    }

    fn stale_counter(&self) -> u32 {
        self.stale_counter
    }

    fn reset_stale_counter(&mut self) {
        self.stale_counter = 0;
    }

    fn increment_stale_counter(&mut self) -> u32 {
        self.stale_counter += 1;
        self.stale_counter
    }

    fn reap_counter(&self) -> u32 {
        self.reap_counter
    }

    fn increment_reap_counter(&mut self) -> u32 {
        self.reap_counter += 1;
        self.reap_counter
    }
}
