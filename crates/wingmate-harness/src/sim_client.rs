//! Turmoil-backed client for end-to-end scenario tests.
//!
//! Owns a [`ClientLink`] pure core and drives it from a
//! `turmoil::net::UdpSocket`, mirroring `wingmate-client`'s own
//! `ClientDriver` but against `turmoil`'s virtual network.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::Level;
use turmoil::net::UdpSocket;
use wingmate_client::{CLIENT_UPDATE_PERIOD_MS, ClientAction, ClientEvent, ClientLink, LifecycleState, SimDataProvider};

use crate::env::SimEnv;

const LEAVE_BURST_COUNT: usize = 10;
const LEAVE_BURST_INTERVAL: Duration = Duration::from_millis(3);

/// What a scenario test observes once a client run finishes.
#[derive(Debug, Clone, Copy)]
pub struct ClientOutcome {
    /// Lifecycle state at the end of the run.
    pub state: LifecycleState,
    /// Number of peers the client was tracking at the end of the run.
    pub active_peer_count: usize,
    /// This client's own session uuid.
    pub session_uuid: u32,
}

/// Drive a `ClientLink` against `hub_host:hub_port` for `duration` of
/// virtual time. If `leave_after` is set, the client issues a LEAVING
/// burst once that much virtual time has elapsed.
///
/// # Errors
///
/// Returns an error if the socket cannot be bound or connected.
pub async fn run_client<S: SimDataProvider>(
    env: SimEnv,
    sim: S,
    name: &str,
    callsign: &str,
    hub_host: &str,
    hub_port: u16,
    duration: Duration,
    leave_after: Option<Duration>,
) -> std::io::Result<ClientOutcome> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect((hub_host, hub_port)).await?;

    let mut link = ClientLink::new(&env, sim, name, callsign);
    let session_uuid = link.session_uuid();

    let mut ticker = tokio::time::interval(Duration::from_millis(CLIENT_UPDATE_PERIOD_MS));
    let deadline = Instant::now() + duration;
    let leave_deadline = leave_after.map(|delay| Instant::now() + delay);
    let mut leave_sent = false;
    let mut buf = vec![0u8; 2048];

    loop {
        tokio::select! {
            () = tokio::time::sleep_until(deadline) => break,
            () = sleep_until_opt(leave_deadline), if !leave_sent && leave_deadline.is_some() => {
                leave_sent = true;
                run_leave_burst(&mut link, &env, &socket).await;
            },
            result = socket.recv(&mut buf) => {
                match result {
                    Ok(len) => {
                        let bytes = Bytes::copy_from_slice(&buf[..len]);
                        let actions = link.process_event(ClientEvent::Datagram { bytes }, env.now());
                        send_actions(&socket, actions).await;
                    },
                    Err(error) => tracing::warn!(%error, "client recv failed"),
                }
            },
            _ = ticker.tick() => {
                let actions = link.process_event(ClientEvent::ReportTick, env.now());
                send_actions(&socket, actions).await;
            },
        }
    }

    Ok(ClientOutcome { state: link.state(), active_peer_count: link.active_peer_count(), session_uuid })
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_leave_burst<S: SimDataProvider>(link: &mut ClientLink<SimEnv, S>, env: &SimEnv, socket: &UdpSocket) {
    let actions = link.process_event(ClientEvent::LeaveRequested, env.now());
    send_actions(socket, actions).await;

    for i in 0..LEAVE_BURST_COUNT {
        match link.encode_leaving() {
            Ok(bytes) => {
                if let Err(error) = socket.send(&bytes).await {
                    tracing::warn!(%error, "leave burst send failed");
                }
            },
            Err(error) => tracing::error!(%error, "failed to encode LEAVING datagram"),
        }
        if i + 1 < LEAVE_BURST_COUNT {
            env.sleep(LEAVE_BURST_INTERVAL).await;
        }
    }

    let actions = link.process_event(ClientEvent::LeaveRequested, env.now());
    send_actions(socket, actions).await;
}

async fn send_actions(socket: &UdpSocket, actions: Vec<ClientAction>) {
    for action in actions {
        match action {
            ClientAction::SendTo { bytes } => {
                if let Err(error) = socket.send(&bytes).await {
                    tracing::warn!(%error, "client send failed");
                }
            },
            ClientAction::Log { level, message } => emit(level, &message),
        }
    }
}

fn emit(level: Level, message: &str) {
    match level {
        Level::ERROR => tracing::error!("{message}"),
        Level::WARN => tracing::warn!("{message}"),
        Level::INFO => tracing::info!("{message}"),
        Level::DEBUG => tracing::debug!("{message}"),
        Level::TRACE => tracing::trace!("{message}"),
    }
}
