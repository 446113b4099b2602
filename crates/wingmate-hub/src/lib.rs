//! The session hub (server role, C5): accepts REPORT/LEAVING datagrams,
//! maintains the membership catalog, and broadcasts WORLDSTATE on a fixed
//! cadence (§4.5).

mod driver;
mod error;
mod hub;
mod member;

pub use driver::HubDriver;
pub use error::HubError;
pub use hub::{Hub, HubAction, HubEvent, MEMBERSHIP_TIMEOUT_TICKS, SERVER_BROADCAST_PERIOD_MS};
pub use member::{NAME_REBROADCAST_TICKS, SessionMember};
