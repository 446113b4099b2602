//! Client error taxonomy (§7).

use thiserror::Error;

/// Errors the client role can raise. [`ClientError::Bind`] is fatal at
/// startup and [`ClientError::TransportFailed`] is fatal once running;
/// every other failure mode in §7 (malformed datagram) is logged and
/// swallowed at the ingestion boundary, never surfaced as `Result::Err`.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Binding the client's socket failed; fatal at startup.
    #[error(transparent)]
    Bind(#[from] wingmate_net::TransportError),

    /// Encoding or decoding a wire payload failed.
    #[error(transparent)]
    Protocol(#[from] wingmate_proto::ProtocolError),

    /// The socket's receiver or sender task hit an unrecoverable transport
    /// error after connect; the client terminates per §7 `TransportFatal`.
    #[error("client transport failed: {0}")]
    TransportFailed(#[source] wingmate_net::TransportError),
}
