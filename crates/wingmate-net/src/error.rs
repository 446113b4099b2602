//! Transport-level error taxonomy (§7 `TransportFatal`).

use thiserror::Error;

/// Errors fatal to the owning role's transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Binding the UDP socket failed; fatal at startup.
    #[error("failed to bind UDP socket on {addr}: {source}")]
    BindFailed {
        /// The address the caller attempted to bind.
        addr: std::net::SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A send to the kernel failed in a way that is not recoverable by
    /// retrying (e.g. the socket was closed out from under the sender).
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// A receive from the kernel failed in a way that is not recoverable by
    /// retrying (e.g. the socket was closed out from under the receiver).
    #[error("recv failed: {0}")]
    RecvFailed(#[source] std::io::Error),
}
