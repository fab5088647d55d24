//! Control messages for the fire-and-forget message path.
//!
//! These travel alongside the data channel and are independent of it:
//! a message can be delivered while no channel is open.

use serde::{Deserialize, Serialize};

use crate::{NodeId, WireError};

/// Path asking the receiver to bring its counterpart app to the foreground.
pub const LAUNCH_REMOTE_APP_PATH: &str = "/counterpart_app_launch";

/// Path asking the receiver to make sure its background collection service runs.
pub const PING_PATH: &str = "/counterpart_ping";

/// Path carrying the wearable's liveness status token.
pub const WEAR_STATUS_PATH: &str = "/wear_status";

/// Liveness status token carried on [`WEAR_STATUS_PATH`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LivenessSignal {
    /// The sender's app is running.
    Alive,
    /// The sender's app is shutting down.
    Inactive,
}

impl LivenessSignal {
    /// The literal token sent on the wire.
    pub fn token(&self) -> &'static str {
        match self {
            Self::Alive => "alive",
            Self::Inactive => "inactive",
        }
    }

    /// Parse a wire token.
    pub fn from_token(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"alive" => Some(Self::Alive),
            b"inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// A decoded control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Request that the receiving node launch its counterpart app.
    LaunchRemoteApp,
    /// Request that the receiving node ensure its collection service is running.
    Ping,
    /// Liveness status of the sending wearable.
    WearStatus(LivenessSignal),
}

impl ControlMessage {
    /// The message path this message is sent on.
    pub fn path(&self) -> &'static str {
        match self {
            Self::LaunchRemoteApp => LAUNCH_REMOTE_APP_PATH,
            Self::Ping => PING_PATH,
            Self::WearStatus(_) => WEAR_STATUS_PATH,
        }
    }

    /// The message payload.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Self::LaunchRemoteApp | Self::Ping => Vec::new(),
            Self::WearStatus(signal) => signal.token().as_bytes().to_vec(),
        }
    }

    /// Decode a message from its path and payload.
    pub fn from_parts(path: &str, data: &[u8]) -> Result<Self, WireError> {
        match path {
            LAUNCH_REMOTE_APP_PATH => Ok(Self::LaunchRemoteApp),
            PING_PATH => Ok(Self::Ping),
            WEAR_STATUS_PATH => LivenessSignal::from_token(data)
                .map(Self::WearStatus)
                .ok_or_else(|| WireError::InvalidPayload {
                    path: path.to_string(),
                    reason: format!("unknown status token ({} bytes)", data.len()),
                }),
            other => Err(WireError::UnknownPath(other.to_string())),
        }
    }
}

/// A raw message as delivered by the mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    /// Node that sent the message.
    pub source: NodeId,
    /// Message path.
    pub path: String,
    /// Raw payload.
    pub data: Vec<u8>,
}

impl MessageEvent {
    /// Decode the payload as a [`ControlMessage`].
    pub fn decode(&self) -> Result<ControlMessage, WireError> {
        ControlMessage::from_parts(&self.path, &self.data)
    }
}

/// Heart-rate message for the cloud relay variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HrMessage {
    /// Heart rate in beats per minute (0 = no reading).
    pub hr_value: i32,
}

impl HrMessage {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rmp_serde::to_vec_named(self).map_err(WireError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        rmp_serde::from_slice(bytes).map_err(WireError::Deserialization)
    }
}
