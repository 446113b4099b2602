//! `SessionMember`: the hub's per-client catalog entry (§3, §4.5).

use std::net::SocketAddr;

use wingmate_core::Member;
use wingmate_proto::{AircraftPosition, IdentityStrings};

/// How many broadcast ticks elapse between unsolicited identity
/// rebroadcasts, expressed as a tick count (`ID_REBROADCAST_PERIOD_MS /
/// SERVER_BROADCAST_PERIOD_MS`).
pub const NAME_REBROADCAST_TICKS: u32 = 7500 / 320;

/// A client known to the hub: its identity, last-reported position, and
/// the bookkeeping needed to decide what the next WORLDSTATE includes.
#[derive(Debug, Clone)]
pub struct SessionMember {
    uuid: u32,
    slot_id: Option<u8>,
    address: SocketAddr,
    name: Option<String>,
    callsign: Option<String>,
    position: AircraftPosition,
    stale_counter: u32,
    reap_counter: u32,
    pending_position_broadcast: bool,
    name_broadcast_countdown: u32,
}

impl SessionMember {
    /// Create a member bound to `address`, from its first REPORT.
    #[must_use]
    pub fn new(uuid: u32, address: SocketAddr, position: AircraftPosition, identity: Option<IdentityStrings>) -> Self {
        let (name, callsign) = match identity {
            Some(identity) => (Some(identity.name), Some(identity.callsign)),
            None => (None, None),
        };
        Self {
            uuid,
            slot_id: None,
            address,
            name,
            callsign,
            position,
            stale_counter: 0,
            reap_counter: 0,
            pending_position_broadcast: true,
            name_broadcast_countdown: 0,
        }
    }

    /// The address this member was admitted from; the hub only accepts
    /// further reports for this uuid from the same address.
    #[must_use]
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Latest reported position.
    #[must_use]
    pub fn position(&self) -> AircraftPosition {
        self.position
    }

    /// Replace the reported position, mark it pending broadcast, and
    /// reset the stale counter.
    pub fn update_position(&mut self, position: AircraftPosition) {
        self.position = position;
        self.pending_position_broadcast = true;
        self.stale_counter = 0;
    }

    /// (Re)announce this member's identity, resetting its name broadcast
    /// countdown so the next tick includes it.
    pub fn set_identity(&mut self, identity: IdentityStrings) {
        self.name = Some(identity.name);
        self.callsign = Some(identity.callsign);
        self.name_broadcast_countdown = 0;
    }

    /// Read and clear the pending-position-broadcast flag.
    pub fn take_pending_position_broadcast(&mut self) -> bool {
        std::mem::replace(&mut self.pending_position_broadcast, false)
    }

    /// Decrement the name broadcast countdown; once it crosses zero,
    /// return `true` (the caller should include this member's identity in
    /// the next WORLDSTATE) and reset the countdown.
    pub fn tick_name_broadcast(&mut self) -> bool {
        if self.name_broadcast_countdown == 0 {
            self.name_broadcast_countdown = NAME_REBROADCAST_TICKS;
            return true;
        }
        self.name_broadcast_countdown -= 1;
        false
    }

    /// This member's current name/callsign, defaulting to empty strings
    /// if it has never announced one (matching the source, which encodes
    /// a name update unconditionally once due, not only when set).
    #[must_use]
    pub fn identity(&self) -> IdentityStrings {
        IdentityStrings {
            name: self.name.clone().unwrap_or_default(),
            callsign: self.callsign.clone().unwrap_or_default(),
        }
    }
}

impl Member for SessionMember {
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
