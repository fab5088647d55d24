//! Connection state reconciliation.
//!
//! Folds presence, channel and liveness inputs into the single
//! [`ConnectionState`] shown to the user.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::liveness::LivenessState;
use crate::presence::PresenceView;
use crate::session::SessionState;

/// Lifecycle of the data channel as seen by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelStatus {
    /// No channel.
    #[default]
    Idle,
    /// Channel open in flight.
    Opening,
    /// Channel open and carrying samples.
    Streaming,
}

impl From<&SessionState> for ChannelStatus {
    fn from(state: &SessionState) -> Self {
        match state {
            SessionState::Idle => Self::Idle,
            SessionState::Opening { .. } => Self::Opening,
            SessionState::Streaming { .. } => Self::Streaming,
        }
    }
}

/// Reconciled connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No remote node reachable.
    #[default]
    NoDeviceFound,
    /// A node is reachable but the counterpart app is not installed on it.
    AppNotInstalled,
    /// The app is installed but not running.
    AppInstalledInactive,
    /// The app is installed and running.
    AppInstalledActive,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NoDeviceFound => "no device found",
            Self::AppNotInstalled => "app not installed",
            Self::AppInstalledInactive => "app installed, inactive",
            Self::AppInstalledActive => "app installed, active",
        };
        f.write_str(label)
    }
}

/// Derive the connection state, first matching rule wins.
pub fn reconcile(
    presence: &PresenceView,
    channel: ChannelStatus,
    liveness: LivenessState,
) -> ConnectionState {
    if !presence.any_reachable() {
        return ConnectionState::NoDeviceFound;
    }
    if presence.installed.is_none() && !liveness.is_active() {
        return ConnectionState::AppNotInstalled;
    }
    if liveness.is_active() || channel == ChannelStatus::Streaming {
        return ConnectionState::AppInstalledActive;
    }
    ConnectionState::AppInstalledInactive
}
