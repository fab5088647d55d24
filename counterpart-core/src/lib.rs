//! # counterpart-core
//!
//! Pure logic for Counterpart (no I/O, instant tests).
//!
//! This crate implements the state machines behind the wearable/handheld
//! pairing protocol without any transport or timer I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. Timers are represented as generation-tagged
//! instructions, so a stale timer is recognised by comparing generations
//! rather than by racing a cancellation.
//!
//! The actual I/O (channels, messages, sleeps) is performed by
//! `counterpart-client`, which interprets the actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod heart_rate;
pub mod liveness;
pub mod presence;
pub mod reconcile;
pub mod session;

pub use heart_rate::{ExpiryAction, HeartRateValue, DEFAULT_HEART_RATE_TTL};
pub use liveness::{
    LivenessState, LivenessTracker, TimerAction, DEFAULT_KEEP_ALIVE_INTERVAL,
    DEFAULT_TIMEOUT_MULTIPLIER,
};
pub use presence::{select_node, PresenceView};
pub use reconcile::{reconcile, ChannelStatus, ConnectionState};
pub use session::{Session, SessionAction, SessionEvent, SessionRole, SessionState};
