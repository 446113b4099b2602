//! `Hub`: the pure, action-returning session hub state machine (§4.5).

use std::net::SocketAddr;

use bytes::Bytes;
use tracing::Level;
use wingmate_core::{Environment, MembershipCatalog, SequenceFilter, SequenceOutcome};
use wingmate_proto::{Command, Envelope, LeavingPayload, MAX_DATAGRAM_LEN, ReportPayload, WorldStatePayload};

use crate::member::SessionMember;

/// Broadcast tick period (§6.2).
pub const SERVER_BROADCAST_PERIOD_MS: u64 = 320;
/// Ticks a member may stay silent before it is expired (§6.2
/// `MEMBERSHIP_TIMEOUT_MS` expressed in ticks).
pub const MEMBERSHIP_TIMEOUT_TICKS: u32 = (5000 / SERVER_BROADCAST_PERIOD_MS) as u32;

/// Input to [`Hub::process_event`].
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// A datagram arrived from `addr`.
    Datagram {
        /// Sender address.
        addr: SocketAddr,
        /// Raw datagram bytes.
        bytes: Bytes,
    },
    /// The broadcast timer fired.
    Tick,
}

/// Output of [`Hub::process_event`], executed by [`crate::driver::HubDriver`].
#[derive(Debug, Clone)]
pub enum HubAction {
    /// Send `bytes` to `addr`.
    SendTo {
        /// Destination address.
        addr: SocketAddr,
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

fn log(level: Level, message: impl Into<String>) -> HubAction {
    HubAction::Log { level, message: message.into() }
}

/// The session hub: a membership catalog, a sequence filter, and the
/// broadcast-tick logic of §4.5. Holds no socket and performs no I/O;
/// [`crate::driver::HubDriver`] is the thin async wrapper that does.
pub struct Hub<E: Environment> {
    catalog: MembershipCatalog<SessionMember>,
    seq_filter: SequenceFilter,
    start: Option<E::Instant>,
    tick_counter: u32,
}

impl<E: Environment> Hub<E> {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            catalog: MembershipCatalog::new(),
            seq_filter: SequenceFilter::new(),
            start: None,
            tick_counter: 0,
        }
    }

    /// Number of currently live members.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.catalog.active_count()
    }

    /// Process one event, returning the actions the driver must execute.
    pub fn process_event(&mut self, event: HubEvent, now: E::Instant) -> Vec<HubAction> {
        match event {
            HubEvent::Datagram { addr, bytes } => self.handle_datagram(addr, &bytes),
            HubEvent::Tick => self.handle_tick(now),
        }
    }

    fn handle_datagram(&mut self, addr: SocketAddr, bytes: &[u8]) -> Vec<HubAction> {
        let envelope = match Envelope::decode(bytes) {
            Ok(envelope) => envelope,
            Err(error) => return vec![log(Level::WARN, format!("malformed envelope from {addr}: {error}"))],
        };
        let payload_end = Envelope::SIZE + envelope.payload_length as usize;
        if payload_end > bytes.len() {
            return vec![log(Level::WARN, format!("truncated datagram from {addr}"))];
        }
        let payload = &bytes[Envelope::SIZE..payload_end];

        if self.seq_filter.check_and_update(addr, envelope.sequence_number) == SequenceOutcome::OutOfOrder {
            return vec![log(Level::DEBUG, format!("out-of-order datagram from {addr} dropped"))];
        }

        match envelope.command {
            Command::Report => self.handle_report(addr, payload),
            Command::Leaving => self.handle_leaving(payload),
            Command::WorldState => vec![log(Level::WARN, format!("unexpected WORLDSTATE from {addr} ignored"))],
        }
    }

    fn handle_report(&mut self, addr: SocketAddr, payload: &[u8]) -> Vec<HubAction> {
        let report = match ReportPayload::decode(payload) {
            Ok(report) => report,
            Err(error) => return vec![log(Level::WARN, format!("malformed REPORT from {addr}: {error}"))],
        };

        match self.catalog.find_mut(report.uuid) {
            Some(member) => {
                if member.address() != addr {
                    return vec![log(
                        Level::WARN,
                        format!("REPORT for {:08x} from unexpected address {addr}", report.uuid),
                    )];
                }
                member.update_position(report.position);
                if let Some(identity) = report.identity {
                    member.set_identity(identity);
                }
                vec![]
            },
            None => {
                let member = SessionMember::new(report.uuid, addr, report.position, report.identity);
                match self.catalog.add(report.uuid, member) {
                    Ok(_slot) => vec![log(Level::INFO, format!("first report from {:08x}", report.uuid))],
                    Err(_full) => vec![log(Level::WARN, format!("session full, dropping {:08x}", report.uuid))],
                }
            },
        }
    }

    fn handle_leaving(&mut self, payload: &[u8]) -> Vec<HubAction> {
        let Ok(leaving) = LeavingPayload::decode(payload) else {
            return vec![log(Level::WARN, "malformed LEAVING payload")];
        };
        self.catalog.remove(leaving.uuid);
        vec![log(Level::INFO, format!("sign out from {:08x}", leaving.uuid))]
    }

    fn handle_tick(&mut self, now: E::Instant) -> Vec<HubAction> {
        let start = *self.start.get_or_insert(now);
        self.tick_counter += 1;

        for member in self.catalog.iter_mut() {
            member.increment_stale_counter();
        }
        self.catalog.check_lapsed(MEMBERSHIP_TIMEOUT_TICKS);
        self.catalog.reap_expired();

        let session_time_ms = (now - start).as_millis() as u32;
        let expired = self.catalog.expired_uuids_for_broadcast();

        let mut positions = Vec::new();
        let mut identity_update = None;
        for member in self.catalog.iter_mut() {
            if member.take_pending_position_broadcast() {
                positions.push((member.uuid(), member.position()));
            }
            if identity_update.is_none() && member.tick_name_broadcast() {
                identity_update = Some((member.uuid(), member.identity()));
            }
        }

        let payload = WorldStatePayload { session_time_ms, expired, positions, identity_update };
        let mut payload_buf = [0u8; wingmate_proto::MAX_PAYLOAD_LEN];
        let payload_len = match payload.encode(&mut payload_buf) {
            Ok(len) => len,
            Err(error) => return vec![log(Level::ERROR, format!("failed to encode WORLDSTATE: {error}"))],
        };

        let envelope = Envelope::new(self.tick_counter, Command::WorldState, &payload_buf[..payload_len]);
        let mut datagram = vec![0u8; MAX_DATAGRAM_LEN];
        let Ok(envelope_len) = envelope.encode(&mut datagram) else {
            return vec![log(Level::ERROR, "failed to encode WORLDSTATE envelope")];
        };
        datagram[envelope_len..envelope_len + payload_len].copy_from_slice(&payload_buf[..payload_len]);
        datagram.truncate(envelope_len + payload_len);
        let datagram = Bytes::from(datagram);

        self.catalog
            .iter()
            .map(|member| HubAction::SendTo { addr: member.address(), bytes: datagram.clone() })
            .collect()
    }
}

impl<E: Environment> Default for Hub<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use wingmate_core::env::testing::ManualEnvironment;
    use wingmate_proto::{AircraftPosition, IdentityStrings, ReportPayload};

    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn sample_position(timestamp_ms: u32) -> AircraftPosition {
        AircraftPosition {
            timestamp_ms,
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
            gear: true,
            beacon: true,
            strobe: false,
            navlight: true,
            taxilight: false,
            landlight: false,
        }
    }

    fn report_datagram(seq: u32, uuid: u32, identity: Option<IdentityStrings>) -> Bytes {
        let report = ReportPayload { uuid, position: sample_position(seq), identity };
        let mut payload_buf = [0u8; 128];
        let payload_len = report.encode(&mut payload_buf).unwrap();
        let envelope = Envelope::new(seq, Command::Report, &payload_buf[..payload_len]);
        let mut buf = [0u8; 256];
        let envelope_len = envelope.encode(&mut buf).unwrap();
        buf[envelope_len..envelope_len + payload_len].copy_from_slice(&payload_buf[..payload_len]);
        Bytes::copy_from_slice(&buf[..envelope_len + payload_len])
    }

    fn leaving_datagram(seq: u32, uuid: u32) -> Bytes {
        let leaving = LeavingPayload { uuid };
        let mut payload_buf = [0u8; 16];
        let payload_len = leaving.encode(&mut payload_buf).unwrap();
        let envelope = Envelope::new(seq, Command::Leaving, &payload_buf[..payload_len]);
        let mut buf = [0u8; 32];
        let envelope_len = envelope.encode(&mut buf).unwrap();
        buf[envelope_len..envelope_len + payload_len].copy_from_slice(&payload_buf[..payload_len]);
        Bytes::copy_from_slice(&buf[..envelope_len + payload_len])
    }

    fn decode_worldstate(bytes: &Bytes) -> WorldStatePayload {
        let envelope = Envelope::decode(bytes).unwrap();
        assert_eq!(envelope.command, Command::WorldState);
        WorldStatePayload::decode(&bytes[Envelope::SIZE..Envelope::SIZE + envelope.payload_length as usize]).unwrap()
    }

    #[test]
    fn first_report_admits_a_new_member() {
        let mut hub: Hub<ManualEnvironment> = Hub::new();
        let env = ManualEnvironment::new(1);
        let actions = hub.process_event(
            HubEvent::Datagram { addr: addr(1), bytes: report_datagram(1, 0xAAAA_1111, None) },
            env.now(),
        );
        assert_eq!(hub.active_count(), 1);
        assert!(actions.iter().any(|a| matches!(a, HubAction::Log { .. })));
    }

    #[test]
    fn report_from_wrong_address_is_ignored() {
        let mut hub: Hub<ManualEnvironment> = Hub::new();
        let env = ManualEnvironment::new(1);
        hub.process_event(
            HubEvent::Datagram { addr: addr(1), bytes: report_datagram(1, 0xAAAA_1111, None) },
            env.now(),
        );
        hub.process_event(
            HubEvent::Datagram { addr: addr(2), bytes: report_datagram(2, 0xAAAA_1111, None) },
            env.now(),
        );
        // Still bound to the original address; the catalog never switched owners.
        assert_eq!(hub.active_count(), 1);
    }

    #[test]
    fn out_of_order_sequence_is_dropped_before_reaching_catalog() {
        let mut hub: Hub<ManualEnvironment> = Hub::new();
        let env = ManualEnvironment::new(1);
        hub.process_event(
            HubEvent::Datagram { addr: addr(1), bytes: report_datagram(10, 0xAAAA_1111, None) },
            env.now(),
        );
        hub.process_event(
            HubEvent::Datagram { addr: addr(1), bytes: report_datagram(9, 0xAAAA_2222, None) },
            env.now(),
        );
        assert_eq!(hub.active_count(), 1, "stale-sequence REPORT from the same peer must not admit a new uuid");
    }

    #[test]
    fn seventeenth_distinct_uuid_is_dropped() {
        let mut hub: Hub<ManualEnvironment> = Hub::new();
        let env = ManualEnvironment::new(1);
        for i in 0..16u32 {
            hub.process_event(
                HubEvent::Datagram { addr: addr(i as u16 + 1), bytes: report_datagram(1, i, None) },
                env.now(),
            );
        }
        assert_eq!(hub.active_count(), 16);

        hub.process_event(
            HubEvent::Datagram { addr: addr(17), bytes: report_datagram(1, 16, None) },
            env.now(),
        );
        assert_eq!(hub.active_count(), 16, "the 17th distinct uuid must find no free slot");
    }

    #[test]
    fn tick_broadcasts_one_worldstate_per_live_member() {
        let mut hub: Hub<ManualEnvironment> = Hub::new();
        let env = ManualEnvironment::new(1);
        hub.process_event(
            HubEvent::Datagram { addr: addr(1), bytes: report_datagram(1, 0xAAAA_1111, None) },
            env.now(),
        );
        hub.process_event(
            HubEvent::Datagram { addr: addr(2), bytes: report_datagram(1, 0xBBBB_2222, None) },
            env.now(),
        );

        let actions = hub.process_event(HubEvent::Tick, env.now());
        let sends: Vec<_> = actions
            .iter()
            .filter_map(|a| match a {
                HubAction::SendTo { addr, bytes } => Some((*addr, bytes.clone())),
                HubAction::Log { .. } => None,
            })
            .collect();
        assert_eq!(sends.len(), 2);

        let worldstate = decode_worldstate(&sends[0].1);
        assert_eq!(worldstate.positions.len(), 2, "both members reported, so both are pending broadcast");
    }

    #[test]
    fn leaving_propagates_to_expired_until_reaped() {
        let mut hub: Hub<ManualEnvironment> = Hub::new();
        let env = ManualEnvironment::new(1);
        hub.process_event(
            HubEvent::Datagram { addr: addr(1), bytes: report_datagram(1, 0xAAAA_1111, None) },
            env.now(),
        );
        hub.process_event(HubEvent::Tick, env.now());

        hub.process_event(
            HubEvent::Datagram { addr: addr(1), bytes: leaving_datagram(2, 0xAAAA_1111) },
            env.now(),
        );
        assert_eq!(hub.active_count(), 0);

        let actions = hub.process_event(HubEvent::Tick, env.now());
        let send = actions.iter().find_map(|a| match a {
            HubAction::SendTo { bytes, .. } => Some(bytes.clone()),
            HubAction::Log { .. } => None,
        });
        // No live members remain to address, so this tick sends nothing, but
        // the expired uuid was still scanned (incrementing its reap counter).
        assert!(send.is_none());
    }

    #[test]
    fn identity_update_included_on_first_tick_when_announced() {
        let mut hub: Hub<ManualEnvironment> = Hub::new();
        let env = ManualEnvironment::new(1);
        let identity = IdentityStrings { name: "Alice".into(), callsign: "AL1".into() };
        hub.process_event(
            HubEvent::Datagram { addr: addr(1), bytes: report_datagram(1, 0xAAAA_1111, Some(identity)) },
            env.now(),
        );

        let actions = hub.process_event(HubEvent::Tick, env.now());
        let bytes = actions
            .iter()
            .find_map(|a| match a {
                HubAction::SendTo { bytes, .. } => Some(bytes.clone()),
                HubAction::Log { .. } => None,
            })
            .unwrap();
        let worldstate = decode_worldstate(&bytes);
        let (uuid, identity) = worldstate.identity_update.unwrap();
        assert_eq!(uuid, 0xAAAA_1111);
        assert_eq!(identity.name, "Alice");
    }

    #[test]
    fn session_time_ms_reflects_elapsed_wall_clock() {
        let mut hub: Hub<ManualEnvironment> = Hub::new();
        let env = ManualEnvironment::new(1);
        hub.process_event(HubEvent::Tick, env.now());
        env.advance(Duration::from_millis(640));
        let actions = hub.process_event(HubEvent::Tick, env.now());
        assert!(actions.is_empty(), "no live members, so no datagrams are sent");
    }
}
