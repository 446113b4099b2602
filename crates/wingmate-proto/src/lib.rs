//! Wire protocol: datagram envelope, fixed-point aircraft position codec,
//! and REPORT/LEAVING/WORLDSTATE payload layouts.
//!
//! Nothing in this crate performs I/O; it only encodes and decodes byte
//! buffers. See `wingmate-net` for the UDP transport and `wingmate-hub`/
//! `wingmate-client` for the state machines that use these wire types.

mod envelope;
mod error;
mod payload;
mod position;

pub use envelope::{Command, Envelope, MAX_DATAGRAM_LEN, MAX_PAYLOAD_LEN};
pub use error::ProtocolError;
pub use payload::{
    IdentityStrings, LeavingPayload, MAX_IDENTITY_LEN, ReportPayload, WorldStatePayload,
    truncate_identity,
};
pub use position::AircraftPosition;
