//! End-to-end test of `HubDriver` against a real loopback socket.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use bytes::Bytes;
use wingmate_core::env::SystemEnvironment;
use wingmate_hub::HubDriver;
use wingmate_net::{Socket, SocketOwner};
use wingmate_proto::{AircraftPosition, Command, Envelope, ReportPayload};

struct Capture {
    tx: tokio::sync::mpsc::UnboundedSender<Bytes>,
}

impl SocketOwner for Capture {
    fn on_datagram(&self, _from: std::net::SocketAddr, bytes: &[u8]) {
        let _ = self.tx.send(Bytes::copy_from_slice(bytes));
    }
}

fn sample_position() -> AircraftPosition {
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

#[tokio::test]
async fn client_report_is_echoed_back_in_worldstate() {
    let driver = HubDriver::bind("127.0.0.1:0".parse().unwrap(), SystemEnvironment, None).await.unwrap();
    let hub_addr = driver.local_addr();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let client_socket = Socket::bind("127.0.0.1:0".parse().unwrap(), std::sync::Arc::new(Capture { tx }))
        .await
        .unwrap();

    let report = ReportPayload { uuid: 0xCAFE_BABE, position: sample_position(), identity: None };
    let mut payload_buf = [0u8; 64];
    let payload_len = report.encode(&mut payload_buf).unwrap();
    let envelope = Envelope::new(1, Command::Report, &payload_buf[..payload_len]);
    let mut datagram = vec![0u8; 128];
    let envelope_len = envelope.encode(&mut datagram).unwrap();
    datagram[envelope_len..envelope_len + payload_len].copy_from_slice(&payload_buf[..payload_len]);
    datagram.truncate(envelope_len + payload_len);

    client_socket.queue(hub_addr, Bytes::from(datagram), true);

    let worldstate_bytes = tokio::time::timeout(Duration::from_millis(1000), async {
        loop {
            let bytes = rx.recv().await.expect("channel closed before a WORLDSTATE arrived");
            let envelope = Envelope::decode(&bytes).unwrap();
            if envelope.command == Command::WorldState {
                return bytes;
            }
        }
    })
    .await
    .expect("hub never broadcast a WORLDSTATE");

    let envelope = Envelope::decode(&worldstate_bytes).unwrap();
    let payload = wingmate_proto::WorldStatePayload::decode(
        &worldstate_bytes[Envelope::SIZE..Envelope::SIZE + envelope.payload_length as usize],
    )
    .unwrap();
    assert!(payload.positions.iter().any(|(uuid, _)| *uuid == 0xCAFE_BABE));

    client_socket.shutdown().await;
    driver.shutdown().await;
}

#[tokio::test]
async fn packet_log_records_received_and_sent_datagrams() {
    let log_dir = tempfile::tempdir().unwrap();
    let driver = HubDriver::bind("127.0.0.1:0".parse().unwrap(), SystemEnvironment, Some(log_dir.path()))
        .await
        .unwrap();
    let hub_addr = driver.local_addr();

    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let client_socket = Socket::bind("127.0.0.1:0".parse().unwrap(), std::sync::Arc::new(Capture { tx }))
        .await
        .unwrap();

    let report = ReportPayload { uuid: 0xFACE_F00D, position: sample_position(), identity: None };
    let mut payload_buf = [0u8; 64];
    let payload_len = report.encode(&mut payload_buf).unwrap();
    let envelope = Envelope::new(1, Command::Report, &payload_buf[..payload_len]);
    let mut datagram = vec![0u8; 128];
    let envelope_len = envelope.encode(&mut datagram).unwrap();
    datagram[envelope_len..envelope_len + payload_len].copy_from_slice(&payload_buf[..payload_len]);
    datagram.truncate(envelope_len + payload_len);
    client_socket.queue(hub_addr, Bytes::from(datagram), true);

    tokio::time::sleep(Duration::from_millis(700)).await;
    client_socket.shutdown().await;
    driver.shutdown().await;

    let contents = std::fs::read_to_string(log_dir.path().join("hub.packetlog")).unwrap();
    assert!(contents.lines().any(|line| line.starts_with("R:")), "the inbound REPORT should be logged");
    assert!(contents.lines().any(|line| line.starts_with("S:")), "the WORLDSTATE broadcast should be logged");
}
