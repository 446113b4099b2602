//! `ClientDriver`: wires the pure [`ClientLink`] state machine to a real
//! [`wingmate_net::Socket`] (§4.6, §5).

use std::{
    fs::File,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use tokio::{
    sync::{Notify, mpsc},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::Level;
use wingmate_core::{
    Environment,
    packetlog::{Direction, PacketLog},
};
use wingmate_net::{Socket, SocketOwner};

use crate::{
    client::{CLIENT_UPDATE_PERIOD_MS, ClientAction, ClientEvent, ClientLink, LifecycleState, SimDataProvider},
    error::ClientError,
};

/// Number of LEAVING datagrams sent when departing, to paper over UDP loss
/// (§4.6.1).
const LEAVE_BURST_COUNT: usize = 10;
/// Interval between LEAVING datagrams in the departure burst.
const LEAVE_BURST_INTERVAL: Duration = Duration::from_millis(3);

/// Everything a client needs to join a session, handed to
/// [`ClientDriver::connect`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The hub's address.
    pub server_addr: IpAddr,
    /// The hub's UDP port.
    pub server_port: u16,
    /// Pilot or aircraft display name, announced with REPORTs.
    pub name: String,
    /// Callsign, announced with REPORTs.
    pub callsign: String,
    /// Opaque passcode carried alongside the session; not validated here.
    pub passcode: Option<String>,
    /// Directory for the optional per-datagram packet log.
    pub log_dir: Option<PathBuf>,
}

type SharedPacketLog = Arc<Mutex<Option<PacketLog<File>>>>;

struct InboundForwarder<E: Environment> {
    tx: mpsc::UnboundedSender<Bytes>,
    hub_addr: SocketAddr,
    packet_log: SharedPacketLog,
    start: E::Instant,
    env: E,
}

impl<E: Environment> SocketOwner for InboundForwarder<E> {
    fn on_datagram(&self, from: SocketAddr, bytes: &[u8]) {
        if from != self.hub_addr {
            tracing::warn!(%from, "datagram from unexpected sender ignored");
            return;
        }
        record(&self.packet_log, Direction::Received, self.env.now() - self.start, from, bytes);
        let _ = self.tx.send(Bytes::copy_from_slice(bytes));
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

fn open_packet_log(log_dir: Option<&Path>) -> Option<PacketLog<File>> {
    let dir = log_dir?;
    match File::create(dir.join("client.packetlog")) {
        Ok(file) => Some(PacketLog::new(file)),
        Err(error) => {
            tracing::warn!(%error, ?dir, "failed to open packet log");
            None
        },
    }
}

/// Owns the client's socket and the background task that drives
/// [`ClientLink`] from inbound WORLDSTATEs, the reporter timer, and
/// `leave_session` requests.
pub struct ClientDriver {
    socket: Arc<Socket>,
    cancel: CancellationToken,
    wake: Arc<Notify>,
    control_tx: mpsc::UnboundedSender<()>,
    fault: Arc<Mutex<Option<ClientError>>>,
    task: JoinHandle<()>,
}

impl ClientDriver {
    /// Bind a client on `local_addr` and start driving it against the hub
    /// named by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Bind`] if the socket cannot be bound.
    pub async fn connect<E: Environment, S: SimDataProvider + 'static>(
        local_addr: SocketAddr,
        config: ClientConfig,
        env: E,
        sim: S,
    ) -> Result<Self, ClientError> {
        if config.passcode.is_some() {
            tracing::info!("passcode configured (carried as opaque metadata, not validated)");
        }

        let hub_addr = SocketAddr::new(config.server_addr, config.server_port);
        let start = env.now();
        let packet_log: SharedPacketLog = Arc::new(Mutex::new(open_packet_log(config.log_dir.as_deref())));

        let (tx, rx) = mpsc::unbounded_channel();
        let owner = Arc::new(InboundForwarder {
            tx,
            hub_addr,
            packet_log: Arc::clone(&packet_log),
            start,
            env: env.clone(),
        });
        let socket = Arc::new(Socket::bind(local_addr, owner).await?);

        let link = ClientLink::new(&env, sim, config.name, config.callsign);
        let cancel = CancellationToken::new();
        let wake = Arc::new(Notify::new());
        let fault = Arc::new(Mutex::new(None));
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run(
            link,
            env,
            start,
            hub_addr,
            Arc::clone(&socket),
            rx,
            control_rx,
            Arc::clone(&wake),
            packet_log,
            cancel.clone(),
            Arc::clone(&fault),
        ));

        Ok(Self { socket, cancel, wake, control_tx, fault, task })
    }

    /// The address the client is actually bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    /// Wake the reporter early, for when the simulator layer has a fresh
    /// position ready before the next scheduled tick (§5).
    pub fn notify_position_changed(&self) {
        self.wake.notify_one();
    }

    /// Ask the client to leave the session. The driver emits the LEAVING
    /// burst and transitions to `GONE` before its task exits.
    pub fn leave_session(&self) {
        let _ = self.control_tx.send(());
    }

    /// Whether the driver's task has already exited, whether from
    /// [`ClientDriver::shutdown`], a graceful departure, or a transport
    /// fault.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.task.is_finished()
    }

    /// Take the fault that caused the driver task to exit on its own, if
    /// any. Returns `None` after a deliberate [`ClientDriver::shutdown`]
    /// or a graceful departure.
    pub fn take_fault(&self) -> Option<ClientError> {
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

#[allow(clippy::too_many_arguments)]
async fn run<E: Environment, S: SimDataProvider>(
    mut link: ClientLink<E, S>,
    env: E,
    start: E::Instant,
    hub_addr: SocketAddr,
    socket: Arc<Socket>,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    mut control_rx: mpsc::UnboundedReceiver<()>,
    wake: Arc<Notify>,
    packet_log: SharedPacketLog,
    cancel: CancellationToken,
    fault: Arc<Mutex<Option<ClientError>>>,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(CLIENT_UPDATE_PERIOD_MS));
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            () = socket.closed() => {
                if let Some(error) = socket.take_fault() {
                    tracing::error!(%error, "client transport died, terminating role");
                    *fault.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(ClientError::TransportFailed(error));
                }
                break;
            },
            Some(bytes) = rx.recv() => ClientEvent::Datagram { bytes },
            Some(()) = control_rx.recv() => ClientEvent::LeaveRequested,
            _ = ticker.tick() => ClientEvent::ReportTick,
            () = wake.notified() => {
                ticker.reset();
                ClientEvent::ReportTick
            },
        };

        let was_leave_request = matches!(event, ClientEvent::LeaveRequested);
        let now = env.now();
        let actions = link.process_event(event, now);
        execute(&socket, hub_addr, &packet_log, now - start, actions);

        if was_leave_request && link.state() == LifecycleState::Leaving {
            run_leave_burst(&mut link, &env, hub_addr, &socket, &packet_log, start).await;
            break;
        }
    }
}

async fn run_leave_burst<E: Environment, S: SimDataProvider>(
    link: &mut ClientLink<E, S>,
    env: &E,
    hub_addr: SocketAddr,
    socket: &Socket,
    packet_log: &SharedPacketLog,
    start: E::Instant,
) {
    for i in 0..LEAVE_BURST_COUNT {
        match link.encode_leaving() {
            Ok(bytes) => {
                record(packet_log, Direction::Sent, env.now() - start, hub_addr, &bytes);
                socket.queue(hub_addr, bytes, true);
            },
            Err(error) => tracing::error!(%error, "failed to encode LEAVING datagram"),
        }
        if i + 1 < LEAVE_BURST_COUNT {
            env.sleep(LEAVE_BURST_INTERVAL).await;
        }
    }
    let actions = link.process_event(ClientEvent::LeaveRequested, env.now());
    execute(socket, hub_addr, packet_log, env.now() - start, actions);
}

fn execute(socket: &Socket, hub_addr: SocketAddr, packet_log: &SharedPacketLog, elapsed: Duration, actions: Vec<ClientAction>) {
    let mut sent_any = false;
    for action in actions {
        match action {
            ClientAction::SendTo { bytes } => {
                record(packet_log, Direction::Sent, elapsed, hub_addr, &bytes);
                socket.queue(hub_addr, bytes, false);
                sent_any = true;
            },
            ClientAction::Log { level, message } => emit(level, &message),
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
