//! # counterpart-types
//!
//! Wire format types for the Counterpart pairing protocol.
//!
//! This crate provides the foundational types shared by every Counterpart crate:
//! - [`NodeId`], [`ChannelId`], [`Channel`] - Identity and addressing types
//! - [`CloseReason`], [`ChannelEvent`] - Channel lifecycle
//! - [`ControlMessage`], [`LivenessSignal`] - Out-of-band message path
//! - [`HeartRate`] - Single-byte sample encoding for the data channel
//! - [`HrMessage`] and relay framing - Cloud relay variant
//! - [`WireError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod capability;
mod channel;
mod envelope;
mod error;
mod ids;
mod messages;
mod sample;

pub use capability::{Capability, PHONE_APP, WEAR_APP, WEAR_APP_ACTIVE};
pub use channel::{Channel, ChannelEvent, CloseReason, HR_CHANNEL_PATH};
pub use envelope::{decode_frame_len, encode_frame, FRAME_HEADER_LEN, MAX_FRAME_SIZE};
pub use error::WireError;
pub use ids::{ChannelId, NodeId};
pub use messages::{
    ControlMessage, HrMessage, LivenessSignal, MessageEvent, LAUNCH_REMOTE_APP_PATH, PING_PATH,
    WEAR_STATUS_PATH,
};
pub use sample::{HeartRate, Reading};
