//! Channel addressing and lifecycle events.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ChannelId, NodeId};

/// Path of the single data channel used for heart-rate streaming.
pub const HR_CHANNEL_PATH: &str = "/hr";

/// A duplex byte-stream session between the local node and `node`.
///
/// This is a descriptor, not the stream itself. Stream handles are obtained
/// from the transport and are only valid while the channel is open.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    /// Transport-assigned identity of this particular opening.
    pub id: ChannelId,
    /// The remote end of the channel.
    pub node: NodeId,
    /// Logical purpose of the channel.
    pub path: String,
}

impl Channel {
    /// Create a channel descriptor.
    pub fn new(id: ChannelId, node: NodeId, path: impl Into<String>) -> Self {
        Self {
            id,
            node,
            path: path.into(),
        }
    }

    /// Whether this is the heart-rate data channel.
    pub fn is_heart_rate(&self) -> bool {
        self.path == HR_CHANNEL_PATH
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Channel({} {}{})", self.id, self.node, self.path)
    }
}

/// Why a channel closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloseReason {
    /// Explicit teardown by either end.
    Normal,
    /// The link between the nodes was lost.
    Disconnected,
    /// The remote end never picked the channel up; its app is presumed not running.
    Timeout,
}

impl CloseReason {
    /// Raw close code: normal.
    pub const CODE_NORMAL: i32 = 0;
    /// Raw close code: disconnected.
    pub const CODE_DISCONNECTED: i32 = 1;
    /// Raw close code: closed by the remote end.
    pub const CODE_REMOTE_CLOSE: i32 = 2;
    /// Raw close code: closed locally.
    pub const CODE_LOCAL_CLOSE: i32 = 3;
    /// Raw close code: timeout.
    pub const CODE_TIMEOUT: i32 = 4;

    /// The canonical raw code for this reason.
    pub fn code(&self) -> i32 {
        match self {
            Self::Normal => Self::CODE_NORMAL,
            Self::Disconnected => Self::CODE_DISCONNECTED,
            Self::Timeout => Self::CODE_TIMEOUT,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Normal => "normal",
            Self::Disconnected => "disconnected",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Channel lifecycle notification broadcast to every registered subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A channel was opened, by either end.
    Opened(Channel),
    /// A channel closed.
    Closed {
        /// The channel that closed.
        channel: Channel,
        /// Why it closed.
        reason: CloseReason,
        /// Application-specific close code supplied by the closer (0 if none).
        app_code: i32,
    },
}

impl ChannelEvent {
    /// The channel this event is about.
    pub fn channel(&self) -> &Channel {
        match self {
            Self::Opened(channel) => channel,
            Self::Closed { channel, .. } => channel,
        }
    }
}
