//! Heart-rate senders.
//!
//! The wearable hands every reading to an [`HrSender`]. [`ChannelHrSender`]
//! streams over the mesh data channel through a producer [`SessionManager`];
//! the TCP relay variant lives in [`crate::relay`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use counterpart_core::{SessionRole, SessionState};
use counterpart_types::{HeartRate, NodeId};
use tokio::sync::watch;

use crate::session::SessionManager;
use crate::transport::MeshTransport;

/// Delivers heart-rate readings to the handheld.
#[async_trait]
pub trait HrSender: Send {
    /// Prepare the sender. Returns `false` when it cannot be used.
    async fn connect(&mut self) -> bool;

    /// Send one reading. Failures are logged, never returned.
    async fn send_value(&mut self, reading: HeartRate);

    /// Release the sender.
    async fn disconnect(&mut self);
}

/// Sender backed by the mesh heart-rate channel.
pub struct ChannelHrSender<T: ?Sized> {
    transport: Arc<T>,
    presence: watch::Receiver<Option<NodeId>>,
    call_timeout: Duration,
    session: Option<SessionManager>,
}

impl<T> ChannelHrSender<T>
where
    T: MeshTransport + ?Sized + 'static,
{
    /// Create a sender that streams to the node selected by `presence`.
    pub fn new(
        transport: Arc<T>,
        presence: watch::Receiver<Option<NodeId>>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            presence,
            call_timeout,
            session: None,
        }
    }

    /// Session state while connected.
    pub fn session_state(&self) -> Option<watch::Receiver<SessionState>> {
        self.session.as_ref().map(SessionManager::state)
    }
}

#[async_trait]
impl<T> HrSender for ChannelHrSender<T>
where
    T: MeshTransport + ?Sized + 'static,
{
    async fn connect(&mut self) -> bool {
        if self.session.is_none() {
            self.session = Some(SessionManager::start(
                Arc::clone(&self.transport),
                SessionRole::Producer,
                self.presence.clone(),
                None,
                self.call_timeout,
            ));
        }
        true
    }

    async fn send_value(&mut self, reading: HeartRate) {
        if let Some(session) = &self.session {
            if !session.write(reading) {
                tracing::warn!("Session stopped, dropping {}", reading);
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            session.shutdown().await;
        }
    }
}
