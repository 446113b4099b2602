//! `HubDriver`: wires the pure [`Hub`] state machine to a real
//! [`wingmate_net::Socket`] (§4.5, §5).

use std::{
    fs::File,
    net::SocketAddr,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Level;
use wingmate_core::{
    Environment,
    packetlog::{Direction, PacketLog},
};
use wingmate_net::{Socket, SocketOwner};

use crate::{
    error::HubError,
    hub::{Hub, HubAction, HubEvent},
};

type SharedPacketLog = Arc<Mutex<Option<PacketLog<File>>>>;

struct InboundForwarder<E: Environment> {
    tx: mpsc::UnboundedSender<(SocketAddr, Bytes)>,
    packet_log: SharedPacketLog,
    start: E::Instant,
    env: E,
}

impl<E: Environment> SocketOwner for InboundForwarder<E> {
    fn on_datagram(&self, from: SocketAddr, bytes: &[u8]) {
        record(&self.packet_log, Direction::Received, self.env.now() - self.start, from, bytes);
        // Forward and return immediately; `Hub::process_event` runs on the
        // driver's own task, never inline on the receiver task.
        let _ = self.tx.send((from, Bytes::copy_from_slice(bytes)));
    }
}

fn record(log: &SharedPacketLog, direction: Direction, elapsed: Duration, peer: SocketAddr, bytes: &[u8]) {
    let Ok(mut guard) = log.lock() else { return };
    if let Some(log) = guard.as_mut() {
        if let Err(error) = log.record(direction, elapsed.as_millis() as u32, peer, bytes) {
            tracing::warn!(%error, "packet log write failed");
        }
    }
}

/// Owns the hub's socket and the background task that drives [`Hub`] from
/// inbound datagrams and the broadcast timer.
pub struct HubDriver {
    socket: Arc<Socket>,
    cancel: CancellationToken,
    fault: Arc<Mutex<Option<HubError>>>,
    task: JoinHandle<()>,
}

impl HubDriver {
    /// Bind a hub on `addr` and start driving it with `env`. When
    /// `log_dir` is `Some`, every sent and received datagram is appended
    /// to `<log_dir>/hub.packetlog` per §6.4.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Bind`] if the socket cannot be bound.
    pub async fn bind<E: Environment>(
        addr: SocketAddr,
        env: E,
        log_dir: Option<&Path>,
    ) -> Result<Self, HubError> {
        let start = env.now();
        let packet_log: SharedPacketLog = Arc::new(Mutex::new(open_packet_log(log_dir)));

        let (tx, rx) = mpsc::unbounded_channel();
        let owner = Arc::new(InboundForwarder {
            tx,
            packet_log: Arc::clone(&packet_log),
            start,
            env: env.clone(),
        });
        let socket = Arc::new(Socket::bind(addr, owner).await?);
        let cancel = CancellationToken::new();
        let fault = Arc::new(Mutex::new(None));

        let task = tokio::spawn(run(
            Hub::<E>::new(),
            env,
            start,
            Arc::clone(&socket),
            rx,
            packet_log,
            cancel.clone(),
            Arc::clone(&fault),
        ));

        Ok(Self { socket, cancel, fault, task })
    }

    /// The address the hub is actually bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    /// Whether the driver's task has already exited, whether from
    /// [`HubDriver::shutdown`] or a transport fault.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.task.is_finished()
    }

    /// Take the fault that caused the driver task to exit on its own, if
    /// any. Returns `None` after a deliberate [`HubDriver::shutdown`].
    pub fn take_fault(&self) -> Option<HubError> {
        self.fault.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take()
    }

    /// Stop the driver task and close the underlying socket.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
        if let Ok(socket) = Arc::try_unwrap(self.socket) {
            socket.shutdown().await;
        }
    }
}

fn open_packet_log(log_dir: Option<&Path>) -> Option<PacketLog<File>> {
    let dir = log_dir?;
    match File::create(dir.join("hub.packetlog")) {
        Ok(file) => Some(PacketLog::new(file)),
        Err(error) => {
            tracing::warn!(%error, ?dir, "failed to open packet log");
            None
        },
    }
}

#[allow(clippy::too_many_arguments)]
async fn run<E: Environment>(
    mut hub: Hub<E>,
    env: E,
    start: E::Instant,
    socket: Arc<Socket>,
    mut rx: mpsc::UnboundedReceiver<(SocketAddr, Bytes)>,
    packet_log: SharedPacketLog,
    cancel: CancellationToken,
    fault: Arc<Mutex<Option<HubError>>>,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(crate::hub::SERVER_BROADCAST_PERIOD_MS));
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            () = socket.closed() => {
                if let Some(error) = socket.take_fault() {
                    tracing::error!(%error, "hub transport died, terminating role");
                    *fault.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(HubError::TransportFailed(error));
                }
                break;
            },
            Some((addr, bytes)) = rx.recv() => HubEvent::Datagram { addr, bytes },
            _ = ticker.tick() => HubEvent::Tick,
        };
        let now = env.now();
        let actions = hub.process_event(event, now);
        execute(&socket, &packet_log, now - start, actions);
    }
}

fn execute(socket: &Socket, packet_log: &SharedPacketLog, elapsed: Duration, actions: Vec<HubAction>) {
    let mut sent_any = false;
    for action in actions {
        match action {
            HubAction::SendTo { addr, bytes } => {
                record(packet_log, Direction::Sent, elapsed, addr, &bytes);
                socket.queue(addr, bytes, false);
                sent_any = true;
            },
            HubAction::Log { level, message } => emit(level, &message),
        }
    }
    if sent_any {
        socket.send_all();
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
