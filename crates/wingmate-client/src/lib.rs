//! Wingmate client link: membership catalog, smoothing predictor, and the
//! client driver (§4.6).
//!
//! [`ClientLink`] is the pure, action-returning state machine; it owns no
//! socket and performs no I/O. [`ClientDriver`] is the thin async wrapper
//! that binds it to a real [`wingmate_net::Socket`]. [`predictor`] is kept
//! public since embedders that already have their own transport may want
//! the smoothing math without the rest of this crate.

mod client;
mod driver;
mod error;
mod member;
pub mod predictor;

pub use client::{
    CLIENT_UPDATE_PERIOD_MS, ClientAction, ClientEvent, ClientLink, LifecycleState,
    MEMBERSHIP_TIMEOUT_TICKS, SimDataProvider,
};
pub use driver::{ClientConfig, ClientDriver};
pub use error::ClientError;
pub use member::TrackedAircraft;
