//! Shared building blocks for the hub and client roles: the
//! [`Environment`] time/randomness abstraction, the generic
//! [`MembershipCatalog`], the [`SequenceFilter`], and the optional
//! per-datagram packet log.

mod catalog;
mod error;
pub mod packetlog;
mod seqfilter;

pub mod env;

pub use catalog::{MAX_IN_SESSION, Member, MembershipCatalog, REAP_THRESHOLD};
pub use env::Environment;
pub use error::CoreError;
pub use seqfilter::{SequenceFilter, SequenceOutcome};
