//! End-to-end scenario tests (§8 S1-S6), run under `turmoil`'s
//! deterministic virtual clock and network.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use bytes::Bytes;
use turmoil::net::UdpSocket;
use wingmate_client::{LifecycleState, predictor::PredictorState};
use wingmate_harness::{FixedPositionSim, SimEnv, alice_position, run_client, run_hub};
use wingmate_proto::{
    AircraftPosition, Command, Envelope, IdentityStrings, LeavingPayload, MAX_DATAGRAM_LEN, MAX_PAYLOAD_LEN, ReportPayload,
    WorldStatePayload,
};

const HUB_PORT: u16 = 6886;

fn encode_report(seq: u32, report: &ReportPayload) -> Bytes {
    let mut payload_buf = [0u8; MAX_PAYLOAD_LEN];
    let payload_len = report.encode(&mut payload_buf).unwrap();
    let envelope = Envelope::new(seq, Command::Report, &payload_buf[..payload_len]);
    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
    let envelope_len = envelope.encode(&mut buf).unwrap();
    buf[envelope_len..envelope_len + payload_len].copy_from_slice(&payload_buf[..payload_len]);
    buf.truncate(envelope_len + payload_len);
    Bytes::from(buf)
}

fn encode_leaving(seq: u32, uuid: u32) -> Bytes {
    let leaving = LeavingPayload { uuid };
    let mut payload_buf = [0u8; 16];
    let payload_len = leaving.encode(&mut payload_buf).unwrap();
    let envelope = Envelope::new(seq, Command::Leaving, &payload_buf[..payload_len]);
    let mut buf = vec![0u8; 32];
    let envelope_len = envelope.encode(&mut buf).unwrap();
    buf[envelope_len..envelope_len + payload_len].copy_from_slice(&payload_buf[..payload_len]);
    buf.truncate(envelope_len + payload_len);
    Bytes::from(buf)
}

fn decode_worldstate(bytes: &[u8]) -> WorldStatePayload {
    let envelope = Envelope::decode(bytes).unwrap();
    assert_eq!(envelope.command, Command::WorldState);
    WorldStatePayload::decode(&bytes[Envelope::SIZE..Envelope::SIZE + envelope.payload_length as usize]).unwrap()
}

fn lat_sample(timestamp_ms: u32, latitude: f64) -> AircraftPosition {
    let mut position = alice_position();
    position.timestamp_ms = timestamp_ms;
    position.latitude = latitude;
    position
}

#[test]
fn s1_single_join_and_first_echo() {
    let mut sim = turmoil::Builder::new().build();
    let hub_env = SimEnv::new(1);

    sim.host("hub", move || {
        let env = hub_env.clone();
        async move {
            run_hub(env, HUB_PORT, Duration::from_millis(1_000)).await?;
            Ok(())
        }
    });

    sim.client("alice", async move {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(("hub", HUB_PORT)).await?;

        let report = ReportPayload {
            uuid: 0xAAAA_1111,
            position: alice_position(),
            identity: Some(IdentityStrings { name: "Alice".into(), callsign: "AL1".into() }),
        };
        socket.send(&encode_report(1, &report)).await?;

        let mut buf = [0u8; 600];
        let len = socket.recv(&mut buf).await?;
        let worldstate = decode_worldstate(&buf[..len]);
        assert_eq!(worldstate.positions.len(), 1, "hub must echo exactly the one joined member");
        let (uuid, position) = worldstate.positions[0];
        assert_eq!(uuid, 0xAAAA_1111);
        assert!((position.latitude - 37.0).abs() < 1e-4);
        assert!((position.longitude - (-122.0)).abs() < 1e-4);
        assert!((position.altitude - 1000.0).abs() < 1.0);
        assert!((position.heading - 90.0).abs() < 1e-2, "heading {}", position.heading);

        Ok(())
    });

    sim.run().unwrap();
}

#[test]
fn s2_address_binding_rejection() {
    let mut sim = turmoil::Builder::new().build();
    let hub_env = SimEnv::new(2);

    sim.host("hub", move || {
        let env = hub_env.clone();
        async move {
            run_hub(env, HUB_PORT, Duration::from_millis(1_500)).await?;
            Ok(())
        }
    });

    sim.client("alice", async move {
        let socket_a = UdpSocket::bind("0.0.0.0:0").await?;
        socket_a.connect(("hub", HUB_PORT)).await?;

        let legit = lat_sample(0, 37.0);
        socket_a.send(&encode_report(1, &ReportPayload { uuid: 0xAAAA_1111, position: legit, identity: None })).await?;

        let mut buf = [0u8; 600];
        let len = socket_a.recv(&mut buf).await?;
        let worldstate = decode_worldstate(&buf[..len]);
        assert_eq!(worldstate.positions[0].1.latitude, 37.0);

        let socket_b = UdpSocket::bind("0.0.0.0:0").await?;
        socket_b.connect(("hub", HUB_PORT)).await?;
        let spoofed = lat_sample(0, 10.0);
        socket_b.send(&encode_report(1, &ReportPayload { uuid: 0xAAAA_1111, position: spoofed, identity: None })).await?;

        // The hub only accepts further reports for a uuid from the address
        // that first claimed it; the spoofed sender never hears back.
        let result = tokio::time::timeout(Duration::from_millis(700), socket_b.recv(&mut buf)).await;
        assert!(result.is_err(), "the address-mismatched sender must never receive a reply");

        // Alice reports again (same position); the stored address is still
        // hers, so the broadcast reflects her value, not the spoofed one.
        socket_a.send(&encode_report(2, &ReportPayload { uuid: 0xAAAA_1111, position: legit, identity: None })).await?;
        let len = socket_a.recv(&mut buf).await?;
        let worldstate = decode_worldstate(&buf[..len]);
        assert_eq!(worldstate.positions[0].1.latitude, 37.0, "the spoofed REPORT must not have overwritten the stored position");

        Ok(())
    });

    sim.run().unwrap();
}

#[test]
fn s3_graceful_departure() {
    let mut sim = turmoil::Builder::new().build();
    let hub_env = SimEnv::new(3);

    sim.host("hub", move || {
        let env = hub_env.clone();
        async move {
            run_hub(env, HUB_PORT, Duration::from_millis(4_000)).await?;
            Ok(())
        }
    });

    sim.client("members", async move {
        let alice_uuid = 0xAAAA_1111;
        let bob_uuid = 0xBBBB_2222;

        let alice = UdpSocket::bind("0.0.0.0:0").await?;
        alice.connect(("hub", HUB_PORT)).await?;
        let bob = UdpSocket::bind("0.0.0.0:0").await?;
        bob.connect(("hub", HUB_PORT)).await?;

        alice.send(&encode_report(1, &ReportPayload { uuid: alice_uuid, position: alice_position(), identity: None })).await?;
        bob.send(&encode_report(1, &ReportPayload { uuid: bob_uuid, position: alice_position(), identity: None })).await?;

        let mut buf = [0u8; 600];
        // First tick: both are admitted and broadcast to.
        let len = bob.recv(&mut buf).await?;
        decode_worldstate(&buf[..len]);

        alice.send(&encode_leaving(2, alice_uuid)).await?;

        // The very next tick must carry alice in `expired`.
        let len = bob.recv(&mut buf).await?;
        let worldstate = decode_worldstate(&buf[..len]);
        assert!(worldstate.expired.contains(&alice_uuid), "the tick right after LEAVING must report the departure");

        // Within REAP_THRESHOLD further ticks, the expired entry is purged.
        let mut still_listed = true;
        for _ in 0..6 {
            let len = bob.recv(&mut buf).await?;
            let worldstate = decode_worldstate(&buf[..len]);
            if !worldstate.expired.contains(&alice_uuid) {
                still_listed = false;
                break;
            }
        }
        assert!(!still_listed, "the departed uuid must eventually be reaped from `expired`");

        Ok(())
    });

    sim.run().unwrap();
}

#[test]
fn s4_sparse_sample_smoothing() {
    let mut predictor = PredictorState::new();
    predictor.update_tracking(lat_sample(0, 0.0), 0, 0.0, 0.0);
    predictor.update_tracking(lat_sample(320, 0.001), 320, 0.0, 0.0);
    predictor.update_tracking(lat_sample(640, 0.002), 640, 0.0, 0.0);

    let at_700 = predictor.get_prediction(700);
    let lower = 0.002;
    let upper = 0.002 + (0.001 / 320.0) * 350.0;
    assert!(
        (lower - 1e-6..=upper + 1e-6).contains(&at_700.latitude),
        "lat {} outside expected band [{lower}, {upper}]",
        at_700.latitude
    );

    let target_ts = 640 + wingmate_client::predictor::PREDICTION_INTERCEPT_MS;
    let at_target = predictor.get_prediction(target_ts);
    let beyond = predictor.get_prediction(1_200);

    let per_second_rate = (0.002 - 0.001) / 0.320;
    let expected_advance = per_second_rate * f64::from(1_200 - target_ts) / 1000.0;
    assert!(
        (beyond.latitude - (at_target.latitude + expected_advance)).abs() < 1e-6,
        "beyond-target lat must advance linearly at the per-second delta rate"
    );
}

#[test]
fn s5_capacity_seventeen_distinct_uuids() {
    let mut sim = turmoil::Builder::new().build();
    let hub_env = SimEnv::new(5);

    sim.host("hub", move || {
        let env = hub_env.clone();
        async move {
            run_hub(env, HUB_PORT, Duration::from_millis(1_000)).await?;
            Ok(())
        }
    });

    sim.client("pilots", async move {
        let mut sockets = Vec::new();
        for i in 0..17u32 {
            let socket = UdpSocket::bind("0.0.0.0:0").await?;
            socket.connect(("hub", HUB_PORT)).await?;
            socket.send(&encode_report(1, &ReportPayload { uuid: i, position: alice_position(), identity: None })).await?;
            sockets.push(socket);
        }

        let mut buf = [0u8; 600];
        let len = sockets[0].recv(&mut buf).await?;
        let worldstate = decode_worldstate(&buf[..len]);
        assert_eq!(worldstate.positions.len(), 16, "the 17th distinct uuid must find no free slot");

        let result = tokio::time::timeout(Duration::from_millis(700), sockets[16].recv(&mut buf)).await;
        assert!(result.is_err(), "the dropped 17th client must never hear from the hub");

        Ok(())
    });

    sim.run().unwrap();
}

#[test]
fn s6_client_autonomy_on_hub_loss() {
    let mut sim = turmoil::Builder::new().build();
    let hub_env = SimEnv::new(6);

    sim.host("hub", move || {
        let env = hub_env.clone();
        async move {
            // The hub exits shortly after admitting the client, simulating
            // a total loss of inbound connectivity: no further WORLDSTATEs
            // ever arrive after this point.
            run_hub(env, HUB_PORT, Duration::from_millis(500)).await?;
            Ok(())
        }
    });

    sim.client("alice", async move {
        let client_env = SimEnv::new(60);
        let sim_data = FixedPositionSim::new(alice_position());
        let outcome =
            run_client(client_env, sim_data, "Alice", "AL1", "hub", HUB_PORT, Duration::from_millis(6_000), None).await?;
        assert_eq!(
            outcome.state,
            LifecycleState::Gone,
            "client must give up once the membership timeout elapses with no WORLDSTATE"
        );

        Ok(())
    });

    sim.run().unwrap();
}
