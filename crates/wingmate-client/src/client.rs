//! `ClientLink`: the pure, action-returning client state machine (§4.6).

use bytes::Bytes;
use tracing::Level;
use wingmate_core::{Environment, Member, MembershipCatalog};
use wingmate_proto::{AircraftPosition, Command, Envelope, IdentityStrings, LeavingPayload, ReportPayload, WorldStatePayload};

use crate::{error::ClientError, member::TrackedAircraft};

/// REPORT emission cadence (§6.2).
pub const CLIENT_UPDATE_PERIOD_MS: u64 = 100;
/// Ticks a client may go without a WORLDSTATE before giving up on the
/// session, and the analogous threshold for expiring a stale peer
/// (§4.6.2 "mirrors the hub but uses `MEMBERSHIP_TIMEOUT_MS /
/// CLIENT_UPDATE_PERIOD_MS`").
pub const MEMBERSHIP_TIMEOUT_TICKS: u32 = (5000 / CLIENT_UPDATE_PERIOD_MS) as u32;
/// While `JOINED`, identity is re-sent every 64th REPORT, checked as a
/// bitmask against the outgoing sequence number rather than a separate
/// countdown (matching the source's `frameNumber & 0x3f`).
const IDENTITY_REBROADCAST_MASK: u32 = 0x3f;

/// This client's place in the session lifecycle (§4.6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Sending REPORTs, waiting for the hub to echo our own uuid back.
    Joining,
    /// Admitted; REPORTs continue on the normal cadence.
    Joined,
    /// `leave_session()` was called; a LEAVING burst is in flight.
    Leaving,
    /// Departed, or timed out without ever hearing from the hub.
    Gone,
}

/// Input to [`ClientLink::process_event`].
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A datagram arrived from the hub.
    Datagram {
        /// Raw datagram bytes.
        bytes: Bytes,
    },
    /// The reporter timer fired (or was woken early).
    ReportTick,
    /// The embedder asked to leave the session.
    LeaveRequested,
}

/// Output of [`ClientLink::process_event`], executed by [`crate::driver::ClientDriver`].
#[derive(Debug, Clone)]
pub enum ClientAction {
    /// Send `bytes` to the hub.
    SendTo {
        /// Encoded datagram.
        bytes: Bytes,
    },
    /// Emit a log line at `level`.
    Log {
        /// Severity.
        level: Level,
        /// Human-readable message.
        message: String,
    },
}

fn log(level: Level, message: impl Into<String>) -> ClientAction {
    ClientAction::Log { level, message: message.into() }
}

/// Collaborator the simulator layer provides to the client link (§6.3).
pub trait SimDataProvider: Send + Sync {
    /// The user's own aircraft, read once per REPORT tick.
    fn user_aircraft_position(&self) -> AircraftPosition;

    /// Push a peer's freshly predicted position into the simulator's slot
    /// table.
    fn set_other_aircraft_position(&self, slot: u8, pos: AircraftPosition);
}

/// The client link: a membership catalog of [`TrackedAircraft`], the
/// lifecycle state of §4.6.1, and the WORLDSTATE ingestion logic of
/// §4.6.2. Holds no socket and performs no I/O; [`crate::driver::ClientDriver`]
/// is the thin async wrapper that does.
pub struct ClientLink<E: Environment, S: SimDataProvider> {
    sim: S,
    session_uuid: u32,
    state: LifecycleState,
    catalog: MembershipCatalog<TrackedAircraft>,
    start: Option<E::Instant>,
    sequence_number: u32,
    ticks_since_worldstate: u32,
    name: String,
    callsign: String,
}

impl<E: Environment, S: SimDataProvider> ClientLink<E, S> {
    /// Create a new link, its session uuid seeded from `env`'s RNG (§4.6.1;
    /// unlike the source, this never touches the wall clock, so the pure
    /// state machine stays fully deterministic under a given `Environment`).
    pub fn new(env: &E, sim: S, name: impl Into<String>, callsign: impl Into<String>) -> Self {
        Self {
            sim,
            session_uuid: env.random_u32(),
            state: LifecycleState::Joining,
            catalog: MembershipCatalog::new(),
            start: None,
            sequence_number: 0,
            ticks_since_worldstate: 0,
            name: name.into(),
            callsign: callsign.into(),
        }
    }

    /// This client's session uuid.
    #[must_use]
    pub fn session_uuid(&self) -> u32 {
        self.session_uuid
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Number of peers currently tracked.
    #[must_use]
    pub fn active_peer_count(&self) -> usize {
        self.catalog.active_count()
    }

    /// Process one event, returning the actions the driver must execute.
    pub fn process_event(&mut self, event: ClientEvent, now: E::Instant) -> Vec<ClientAction> {
        match event {
            ClientEvent::Datagram { bytes } => self.handle_datagram(&bytes, now),
            ClientEvent::ReportTick => self.handle_report_tick(now),
            ClientEvent::LeaveRequested => self.handle_leave_requested(),
        }
    }

    /// Encode one LEAVING datagram, bumping the outgoing sequence number.
    /// Called directly by the driver's leave burst, outside the normal
    /// event loop, since the burst's 10-sends-at-3ms cadence has no
    /// corresponding `ClientEvent`.
    pub fn encode_leaving(&mut self) -> Result<Bytes, ClientError> {
        self.sequence_number += 1;
        let leaving = LeavingPayload { uuid: self.session_uuid };
        let mut payload_buf = [0u8; 16];
        let payload_len = leaving.encode(&mut payload_buf)?;
        let envelope = Envelope::new(self.sequence_number, Command::Leaving, &payload_buf[..payload_len]);
        let mut datagram = vec![0u8; Envelope::SIZE + payload_len];
        let envelope_len = envelope.encode(&mut datagram)?;
        datagram[envelope_len..envelope_len + payload_len].copy_from_slice(&payload_buf[..payload_len]);
        Ok(Bytes::from(datagram))
    }

    fn local_ms(&mut self, now: E::Instant) -> u32 {
        let start = *self.start.get_or_insert(now);
        (now - start).as_millis() as u32
    }

    fn handle_datagram(&mut self, bytes: &[u8], now: E::Instant) -> Vec<ClientAction> {
        let envelope = match Envelope::decode(bytes) {
            Ok(envelope) => envelope,
            Err(error) => return vec![log(Level::WARN, format!("malformed envelope from hub: {error}"))],
        };
        let payload_end = Envelope::SIZE + envelope.payload_length as usize;
        if payload_end > bytes.len() {
            return vec![log(Level::WARN, "truncated datagram from hub")];
        }
        let payload = &bytes[Envelope::SIZE..payload_end];

        match envelope.command {
            Command::WorldState => match WorldStatePayload::decode(payload) {
                Ok(worldstate) => self.handle_worldstate(worldstate, now),
                Err(error) => vec![log(Level::WARN, format!("malformed WORLDSTATE: {error}"))],
            },
            Command::Report | Command::Leaving => vec![log(Level::WARN, "unexpected datagram from hub ignored")],
        }
    }

    fn handle_worldstate(&mut self, worldstate: WorldStatePayload, now: E::Instant) -> Vec<ClientAction> {
        self.ticks_since_worldstate = 0;
        let now_ms = self.local_ms(now);
        let user = self.sim.user_aircraft_position();
        let mut actions = Vec::new();

        for uuid in worldstate.expired {
            self.catalog.remove(uuid);
        }

        for (uuid, position) in worldstate.positions {
            if uuid == self.session_uuid {
                if self.state == LifecycleState::Joining {
                    self.state = LifecycleState::Joined;
                    actions.push(log(Level::INFO, format!("joined session as {:08x}", self.session_uuid)));
                }
                continue;
            }
            if self.catalog.find(uuid).is_none() {
                if self.catalog.add(uuid, TrackedAircraft::new(uuid)).is_err() {
                    actions.push(log(Level::WARN, format!("local catalog full, dropping peer {uuid:08x}")));
                    continue;
                }
            }
            if let Some(member) = self.catalog.find_mut(uuid) {
                member.update_tracking(position, now_ms, user.latitude, user.longitude);
            }
        }

        if let Some((uuid, identity)) = worldstate.identity_update {
            if uuid != self.session_uuid {
                if let Some(member) = self.catalog.find_mut(uuid) {
                    member.set_identity(identity);
                }
            }
        }

        self.push_predictions(now_ms);
        actions
    }

    fn handle_report_tick(&mut self, now: E::Instant) -> Vec<ClientAction> {
        let now_ms = self.local_ms(now);
        let mut actions = Vec::new();

        if self.state == LifecycleState::Gone {
            return actions;
        }

        self.ticks_since_worldstate += 1;
        if self.ticks_since_worldstate > MEMBERSHIP_TIMEOUT_TICKS {
            self.state = LifecycleState::Gone;
            actions.push(log(Level::WARN, "no WORLDSTATE received within the membership timeout; session is gone"));
            return actions;
        }

        self.push_predictions(now_ms);

        if self.state != LifecycleState::Leaving {
            let mut position = self.sim.user_aircraft_position();
            position.timestamp_ms = now_ms;
            match self.encode_report(position) {
                Ok(bytes) => actions.push(ClientAction::SendTo { bytes }),
                Err(error) => actions.push(log(Level::ERROR, format!("failed to encode REPORT: {error}"))),
            }
        }

        for member in self.catalog.iter_mut() {
            member.increment_stale_counter();
        }
        self.catalog.check_lapsed(MEMBERSHIP_TIMEOUT_TICKS);
        self.catalog.reap_expired();

        actions
    }

    fn handle_leave_requested(&mut self) -> Vec<ClientAction> {
        match self.state {
            LifecycleState::Joining | LifecycleState::Joined => {
                self.state = LifecycleState::Leaving;
                vec![log(Level::INFO, "leaving session")]
            },
            LifecycleState::Leaving | LifecycleState::Gone => {
                self.state = LifecycleState::Gone;
                vec![]
            },
        }
    }

    fn encode_report(&mut self, position: AircraftPosition) -> Result<Bytes, ClientError> {
        self.sequence_number += 1;
        let include_identity = self.state == LifecycleState::Joining || self.sequence_number & IDENTITY_REBROADCAST_MASK == 0;
        let identity = include_identity.then(|| IdentityStrings { name: self.name.clone(), callsign: self.callsign.clone() });

        let report = ReportPayload { uuid: self.session_uuid, position, identity };
        let mut payload_buf = [0u8; wingmate_proto::MAX_PAYLOAD_LEN];
        let payload_len = report.encode(&mut payload_buf)?;
        let envelope = Envelope::new(self.sequence_number, Command::Report, &payload_buf[..payload_len]);
        let mut datagram = vec![0u8; wingmate_proto::MAX_DATAGRAM_LEN];
        let envelope_len = envelope.encode(&mut datagram)?;
        datagram[envelope_len..envelope_len + payload_len].copy_from_slice(&payload_buf[..payload_len]);
        datagram.truncate(envelope_len + payload_len);
        Ok(Bytes::from(datagram))
    }

    fn push_predictions(&mut self, now_ms: u32) {
        for member in self.catalog.iter_mut() {
            let Some(slot) = member.slot_id() else { continue };
            let predicted = member.get_prediction(now_ms);
            self.sim.set_other_aircraft_position(slot, predicted);
        }
    }
}
