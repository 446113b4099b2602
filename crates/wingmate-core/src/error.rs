//! Cross-cutting error taxonomy shared by the hub and client roles.

use thiserror::Error;

/// Errors raised by the membership catalog and sequence filter.
///
/// Per §7, `Full` is the only one of these that reaches a caller as a
/// `Result::Err` — `OutOfOrder`, `DatagramMalformed`, and `AddressMismatch`
/// are represented as plain return values (`None`/`bool`) at their
/// respective call sites, since the propagation policy swallows them at
/// the ingestion boundary rather than bubbling them as errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    /// The membership catalog has no free slot.
    #[error("membership catalog is full")]
    Full,
}
