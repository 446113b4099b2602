//! Hub error taxonomy (§7).

use thiserror::Error;

/// Errors the hub role can raise. [`HubError::Bind`] is fatal at startup
/// and [`HubError::TransportFailed`] is fatal once running; every other
/// failure mode in §7 (malformed datagram, out-of-order, address mismatch)
/// is logged and swallowed at the ingestion boundary, never surfaced as
/// `Result::Err`.
#[derive(Debug, Error)]
pub enum HubError {
    /// Binding the hub's socket failed; fatal at startup.
    #[error(transparent)]
    Bind(#[from] wingmate_net::TransportError),

    /// The socket's receiver or sender task hit an unrecoverable transport
    /// error after bind; the hub terminates per §7 `TransportFatal`.
    #[error("hub transport failed: {0}")]
    TransportFailed(#[source] wingmate_net::TransportError),
}
