//! UDP transport: a receiver task, a sender task, and the FIFO queue
//! between them (§4.4).

use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use tokio::{net::UdpSocket, sync::Notify, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

/// Maximum single-datagram size the receiver will accept into its scratch
/// buffer. Anything the kernel delivers larger than this is truncated by
/// `recv_from` and handed to the owner as-is; decoding it is the owner's
/// problem (the wire codec rejects oversized payloads on its own terms).
const RECV_BUFFER_LEN: usize = 2048;

/// How long the sender task waits on its [`Notify`] before waking anyway to
/// re-check the queue and the cancellation token.
const SENDER_FALLBACK_INTERVAL: Duration = Duration::from_secs(1);

/// Receives inbound datagrams for a bound [`Socket`].
///
/// Implementors must return promptly from `on_datagram`: the receiver task
/// calls it inline, between `recv_from` calls, so a slow or blocking
/// implementation stalls delivery of every subsequent datagram on this
/// socket.
pub trait SocketOwner: Send + Sync + 'static {
    /// Called once per received datagram, with the sender's address and the
    /// datagram's bytes.
    fn on_datagram(&self, from: SocketAddr, bytes: &[u8]);
}

/// A bound UDP socket with a background receiver task and a background
/// sender task draining an outbound FIFO queue.
///
/// Dropping a `Socket` does not stop its tasks; call [`Socket::shutdown`]
/// and await it to wind both down cleanly.
pub struct Socket {
    local_addr: SocketAddr,
    queue: Arc<Mutex<VecDeque<(SocketAddr, Bytes)>>>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
    fault: Arc<Mutex<Option<TransportError>>>,
    receiver: JoinHandle<()>,
    sender: JoinHandle<()>,
}

impl Socket {
    /// Bind a UDP socket at `addr` and start its receiver/sender tasks.
    /// `owner` receives every inbound datagram.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::BindFailed`] if the OS refuses the bind.
    pub async fn bind(
        addr: SocketAddr,
        owner: Arc<dyn SocketOwner>,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::BindFailed { addr, source })?;
        let local_addr = socket.local_addr().map_err(|source| TransportError::BindFailed {
            addr,
            source,
        })?;
        let socket = Arc::new(socket);
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let wake = Arc::new(Notify::new());
        let cancel = CancellationToken::new();
        let fault = Arc::new(Mutex::new(None));

        let receiver = tokio::spawn(receive_loop(Arc::clone(&socket), owner, cancel.clone(), Arc::clone(&fault)));
        let sender = tokio::spawn(send_loop(
            socket,
            Arc::clone(&queue),
            Arc::clone(&wake),
            cancel.clone(),
            Arc::clone(&fault),
        ));

        tracing::info!(%local_addr, "socket bound");

        Ok(Self { local_addr, queue, wake, cancel, fault, receiver, sender })
    }

    /// The address the kernel actually bound to (relevant when `addr`'s
    /// port was 0).
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Enqueue a datagram for `target`. When `send_now` is `false`, the
    /// sender task is not woken immediately; use this when a caller is
    /// about to enqueue several datagrams in a row and will call
    /// [`Socket::send_all`] once at the end.
    pub fn queue(&self, target: SocketAddr, bytes: Bytes, send_now: bool) {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push_back((target, bytes));
        if send_now {
            self.send_all();
        }
    }

    /// Wake the sender task to drain whatever is currently queued.
    pub fn send_all(&self) {
        self.wake.notify_one();
    }

    /// Signal both background tasks to stop and wait for them to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.wake.notify_one();
        let _ = self.receiver.await;
        let _ = self.sender.await;
    }

    /// Resolves once both background tasks have stopped, whether from
    /// [`Socket::shutdown`] or an unrecoverable transport fault (§4.4,
    /// §4.5). A caller driving this socket should race this against its
    /// own event loop to notice the latter promptly.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    /// Take the fault that caused the background tasks to stop on their
    /// own, if any. Returns `None` after a deliberate [`Socket::shutdown`].
    pub fn take_fault(&self) -> Option<TransportError> {
        self.fault.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take()
    }
}

/// Record `error` as the socket's terminal fault (first one wins) and
/// cancel both background tasks; per spec this is fatal to the owning
/// role's transport.
fn fault_and_cancel(fault: &Mutex<Option<TransportError>>, cancel: &CancellationToken, error: TransportError) {
    let mut guard = fault.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if guard.is_none() {
        tracing::error!(%error, "socket transport terminated");
        *guard = Some(error);
    }
    drop(guard);
    cancel.cancel();
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    owner: Arc<dyn SocketOwner>,
    cancel: CancellationToken,
    fault: Arc<Mutex<Option<TransportError>>>,
) {
    let mut buf = vec![0u8; RECV_BUFFER_LEN];
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, from)) => owner.on_datagram(from, &buf[..len]),
                    Err(error) => {
                        fault_and_cancel(&fault, &cancel, TransportError::RecvFailed(error));
                        break;
                    },
                }
            },
        }
    }
}

async fn send_loop(
    socket: Arc<UdpSocket>,
    queue: Arc<Mutex<VecDeque<(SocketAddr, Bytes)>>>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
    fault: Arc<Mutex<Option<TransportError>>>,
) {
    'outer: loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = wake.notified() => {},
            () = tokio::time::sleep(SENDER_FALLBACK_INTERVAL) => {},
        }
        if cancel.is_cancelled() {
            break;
        }
        loop {
            let next = queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).pop_front();
            let Some((target, bytes)) = next else { break };
            if let Err(error) = socket.send_to(&bytes, target).await {
                fault_and_cancel(&fault, &cancel, TransportError::SendFailed(error));
                break 'outer;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingOwner {
        count: Arc<AtomicUsize>,
        last: Mutex<Option<Vec<u8>>>,
    }

    impl SocketOwner for CountingOwner {
        fn on_datagram(&self, _from: SocketAddr, bytes: &[u8]) {
            self.count.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(bytes.to_vec());
        }
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition never became true");
    }

    #[tokio::test]
    async fn bind_assigns_a_port_when_zero_requested() {
        let owner = Arc::new(CountingOwner { count: Arc::new(AtomicUsize::new(0)), last: Mutex::new(None) });
        let socket = Socket::bind("127.0.0.1:0".parse().unwrap(), owner).await.unwrap();
        assert_ne!(socket.local_addr().port(), 0);
        socket.shutdown().await;
    }

    #[tokio::test]
    async fn bind_rejects_already_bound_address() {
        let owner_a = Arc::new(CountingOwner { count: Arc::new(AtomicUsize::new(0)), last: Mutex::new(None) });
        let first = Socket::bind("127.0.0.1:0".parse().unwrap(), owner_a).await.unwrap();
        let taken = first.local_addr();

        let owner_b = Arc::new(CountingOwner { count: Arc::new(AtomicUsize::new(0)), last: Mutex::new(None) });
        let second = Socket::bind(taken, owner_b).await;
        assert!(matches!(second, Err(TransportError::BindFailed { .. })));

        first.shutdown().await;
    }

    #[tokio::test]
    async fn datagram_round_trips_between_two_sockets() {
        let count = Arc::new(AtomicUsize::new(0));
        let owner_a = Arc::new(CountingOwner { count: Arc::clone(&count), last: Mutex::new(None) });
        let owner_b = Arc::new(CountingOwner { count: Arc::new(AtomicUsize::new(0)), last: Mutex::new(None) });

        let a = Socket::bind("127.0.0.1:0".parse().unwrap(), owner_a).await.unwrap();
        let b = Socket::bind("127.0.0.1:0".parse().unwrap(), owner_b).await.unwrap();

        b.queue(a.local_addr(), Bytes::from_static(b"hello"), true);

        wait_until(|| count.load(Ordering::SeqCst) == 1).await;

        a.shutdown().await;
        b.shutdown().await;
    }

    #[tokio::test]
    async fn queue_without_send_all_does_not_deliver_until_woken() {
        let count = Arc::new(AtomicUsize::new(0));
        let owner_a = Arc::new(CountingOwner { count: Arc::clone(&count), last: Mutex::new(None) });
        let owner_b = Arc::new(CountingOwner { count: Arc::new(AtomicUsize::new(0)), last: Mutex::new(None) });

        let a = Socket::bind("127.0.0.1:0".parse().unwrap(), owner_a).await.unwrap();
        let b = Socket::bind("127.0.0.1:0".parse().unwrap(), owner_b).await.unwrap();

        b.queue(a.local_addr(), Bytes::from_static(b"queued"), false);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        b.send_all();
        wait_until(|| count.load(Ordering::SeqCst) == 1).await;

        a.shutdown().await;
        b.shutdown().await;
    }
}
