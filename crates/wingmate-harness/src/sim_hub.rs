//! Turmoil-backed hub for end-to-end scenario tests.
//!
//! Owns a [`Hub`] pure core and drives it from a `turmoil::net::UdpSocket`,
//! mirroring `wingmate-hub`'s own `HubDriver`/execute-actions split but
//! against `turmoil`'s virtual network instead of a real OS socket (the
//! production `wingmate_net::Socket` binds a real `tokio::net::UdpSocket`,
//! which `turmoil` does not intercept).

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::Level;
use turmoil::net::UdpSocket;
use wingmate_hub::{Hub, HubAction, HubEvent, SERVER_BROADCAST_PERIOD_MS};

use crate::env::SimEnv;

const RECV_BUFFER_LEN: usize = 2048;

/// Run a hub bound to `port` for `duration` of virtual time, then return
/// the final [`Hub`] so the caller can assert on its state.
///
/// # Errors
///
/// Returns an error if the socket cannot be bound.
pub async fn run_hub(env: SimEnv, port: u16, duration: Duration) -> std::io::Result<Hub<SimEnv>> {
    let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
    let mut hub: Hub<SimEnv> = Hub::new();
    let mut ticker = tokio::time::interval(Duration::from_millis(SERVER_BROADCAST_PERIOD_MS));
    let deadline = Instant::now() + duration;
    let mut buf = vec![0u8; RECV_BUFFER_LEN];

    loop {
        tokio::select! {
            () = tokio::time::sleep_until(deadline) => break,
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, from)) => {
                        let bytes = Bytes::copy_from_slice(&buf[..len]);
                        let actions = hub.process_event(HubEvent::Datagram { addr: from, bytes }, env.now());
                        send_actions(&socket, actions).await;
                    },
                    Err(error) => tracing::warn!(%error, "hub recv_from failed"),
                }
            },
            _ = ticker.tick() => {
                let actions = hub.process_event(HubEvent::Tick, env.now());
                send_actions(&socket, actions).await;
            },
        }
    }

    Ok(hub)
}

async fn send_actions(socket: &UdpSocket, actions: Vec<HubAction>) {
    for action in actions {
        match action {
            HubAction::SendTo { addr, bytes } => {
                if let Err(error) = socket.send_to(&bytes, addr).await {
                    tracing::warn!(%error, %addr, "hub send_to failed");
                }
            },
            HubAction::Log { level, message } => emit(level, &message),
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
