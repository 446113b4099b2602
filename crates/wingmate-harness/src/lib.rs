//! Deterministic end-to-end simulation harness for `wingmate`.
//!
//! Drives the hub and client pure cores ([`wingmate_hub::Hub`],
//! [`wingmate_client::ClientLink`]) against `turmoil`'s virtual clock and
//! virtual network instead of real time and real sockets, covering the
//! end-to-end scenarios S1-S6.

pub mod env;
pub mod fixtures;
pub mod sim_client;
pub mod sim_hub;

pub use env::SimEnv;
pub use fixtures::{FixedPositionSim, alice_position};
pub use sim_client::{ClientOutcome, run_client};
pub use sim_hub::run_hub;
