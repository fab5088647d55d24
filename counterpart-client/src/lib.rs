//! # counterpart-client
//!
//! Async runtime for the Counterpart wearable/handheld pairing protocol.
//!
//! The pure machines in counterpart-core decide what should happen; this crate
//! runs them on tokio against a [`MeshTransport`] and publishes their state
//! through `watch` cells.
//!
//! ## Components
//!
//! - **Presence**: [`PresenceTracker`] follows the selected reachable node
//! - **Session**: [`SessionManager`] owns the heart-rate data channel
//! - **Liveness**: [`LivenessSender`] / [`LivenessMonitor`] keep-alive signaling
//! - **Reconciler**: [`ConnectionReconciler`] folds everything into a [`ConnectionState`]
//! - **Apps**: [`WearableApp`] and [`HandheldApp`] wire the pieces together
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use counterpart_client::{CounterpartConfig, HandheldApp, MemoryMesh, WearableApp};
//!
//! let mesh = MemoryMesh::new();
//! let config = CounterpartConfig::default();
//! let phone = HandheldApp::start(Arc::new(mesh.join("phone")), &config).await;
//! let mut watch = WearableApp::start(Arc::new(mesh.join("watch")), config).await;
//!
//! watch.start_collecting().await?;
//! let mut hr = phone.heart_rate();
//! hr.changed().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod handheld;
pub mod heart_rate;
pub mod liveness;
pub mod presence;
pub mod reconciler;
pub mod relay;
pub mod sender;
pub mod sensor;
pub mod session;
pub mod transport;
pub mod wearable;

mod timer;

#[cfg(test)]
mod test_util;

pub use config::{ConfigError, CounterpartConfig, LivenessSource, SenderKind, SensorKind};
pub use counterpart_core::{ConnectionState, LivenessState, SessionRole, SessionState};
pub use error::ClientError;
pub use handheld::HandheldApp;
pub use heart_rate::HeartRateFeed;
pub use liveness::{LivenessMonitor, LivenessSender};
pub use presence::{PresenceTracker, WearableSelection};
pub use reconciler::{ConnectionReconciler, ReconcilerInputs};
pub use relay::{RelayHrSender, RelayListener, RelayMessage, RelayServer};
pub use sender::{ChannelHrSender, HrSender};
pub use sensor::{HeartRateSensor, ScriptedSensor, SimulatedSensor};
pub use session::SessionManager;
pub use transport::{
    MemoryMesh, MemoryNode, MeshTransport, NodeFilter, Subscription, TransportError,
};
pub use wearable::{RemoteRequest, WearableApp};
