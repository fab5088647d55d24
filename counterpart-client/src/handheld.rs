//! Handheld side of the pairing.
//!
//! [`HandheldApp`] advertises the handheld capability and wires the runtime
//! pieces together:
//!
//! ```text
//! reachable tracker ──┐
//! installed tracker ──┼──▶ ConnectionReconciler ──▶ connection_state()
//! consumer session ───┤
//! liveness monitor ───┘
//!
//! consumer session ──▶ HeartRateFeed ──▶ heart_rate()
//! ```

use std::sync::Arc;
use std::time::Duration;

use counterpart_core::{ConnectionState, LivenessState, SessionRole, SessionState};
use counterpart_types::{ControlMessage, HeartRate, NodeId, PHONE_APP, WEAR_APP};
use tokio::sync::watch;

use crate::config::CounterpartConfig;
use crate::heart_rate::HeartRateFeed;
use crate::liveness::LivenessMonitor;
use crate::presence::{PresenceTracker, WearableSelection};
use crate::reconciler::{ConnectionReconciler, ReconcilerInputs};
use crate::session::SessionManager;
use crate::transport::{bounded, MeshTransport, NodeFilter};

/// The handheld application.
pub struct HandheldApp<T: ?Sized> {
    transport: Arc<T>,
    call_timeout: Duration,
    reachable: PresenceTracker,
    installed: PresenceTracker,
    wearable: WearableSelection,
    feed: HeartRateFeed,
    session: SessionManager,
    liveness: LivenessMonitor,
    reconciler: ConnectionReconciler,
}

impl<T> HandheldApp<T>
where
    T: MeshTransport + ?Sized + 'static,
{
    /// Advertise the handheld app and start every runtime component.
    pub async fn start(transport: Arc<T>, config: &CounterpartConfig) -> Self {
        let call_timeout = config.call_timeout();
        if let Err(e) = bounded(call_timeout, transport.advertise(PHONE_APP)).await {
            tracing::warn!("Could not advertise {}: {}", PHONE_APP, e);
        }

        let reachable = PresenceTracker::start(
            Arc::clone(&transport),
            NodeFilter::Reachable,
            call_timeout,
        );
        let installed = PresenceTracker::start(
            Arc::clone(&transport),
            NodeFilter::Capability(WEAR_APP),
            call_timeout,
        );
        let wearable = WearableSelection::new(installed.subscribe(), reachable.subscribe());
        let feed = HeartRateFeed::spawn(config.heart_rate_ttl());
        let session = SessionManager::start(
            Arc::clone(&transport),
            SessionRole::Consumer,
            installed.subscribe(),
            Some(feed.clone()),
            call_timeout,
        );
        let liveness = LivenessMonitor::start(
            Arc::clone(&transport),
            config.liveness.source,
            wearable.clone(),
            config.keep_alive_interval(),
            config.liveness.timeout_multiplier,
            call_timeout,
        );
        let reconciler = ConnectionReconciler::start(ReconcilerInputs {
            reachable: reachable.subscribe(),
            installed: installed.subscribe(),
            session: session.state(),
            liveness: liveness.state(),
        });

        tracing::info!("Handheld {} started", transport.local_node());
        Self {
            transport,
            call_timeout,
            reachable,
            installed,
            wearable,
            feed,
            session,
            liveness,
            reconciler,
        }
    }

    /// Ask the wearable to bring its app to the foreground.
    ///
    /// Returns `false` when no wearable is present or the message failed.
    pub async fn launch_remote_app(&self) -> bool {
        self.send_control(ControlMessage::LaunchRemoteApp).await
    }

    /// Ask the wearable to make sure its collection service runs.
    pub async fn ping(&self) -> bool {
        self.send_control(ControlMessage::Ping).await
    }

    async fn send_control(&self, message: ControlMessage) -> bool {
        let Some(node) = self.wearable.current() else {
            tracing::warn!("No wearable to send {} to", message.path());
            return false;
        };
        let payload = message.payload();
        match bounded(
            self.call_timeout,
            self.transport.send_message(&node, message.path(), &payload),
        )
        .await
        {
            Ok(request) => {
                tracing::debug!("Sent {} to {} (request {})", message.path(), node, request);
                true
            }
            Err(e) => {
                tracing::warn!("Sending {} to {} failed: {}", message.path(), node, e);
                false
            }
        }
    }

    /// Subscribe to the reconciled connection state.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.reconciler.state()
    }

    /// Subscribe to remote liveness.
    pub fn liveness(&self) -> watch::Receiver<LivenessState> {
        self.liveness.state()
    }

    /// Subscribe to the displayed heart rate.
    pub fn heart_rate(&self) -> watch::Receiver<HeartRate> {
        self.feed.subscribe()
    }

    /// Subscribe to the data-channel session.
    pub fn session_state(&self) -> watch::Receiver<SessionState> {
        self.session.state()
    }

    /// The reachable wearable, if any.
    pub fn wear_node(&self) -> Option<NodeId> {
        self.reachable.current()
    }

    /// Whether the wearable app is known to be installed.
    ///
    /// An `alive` from the wearable counts as proof of installation.
    pub fn is_app_installed(&self) -> bool {
        self.installed.current().is_some() || self.liveness.current().is_active()
    }

    /// Whether the wearable app is running.
    pub fn is_app_active(&self) -> bool {
        self.reconciler.current() == ConnectionState::AppInstalledActive
    }

    /// Stop every component and withdraw the app.
    pub async fn shutdown(self) {
        self.reconciler.shutdown().await;
        self.session.shutdown().await;
        self.liveness.shutdown().await;
        self.installed.shutdown().await;
        self.reachable.shutdown().await;

        if let Err(e) = bounded(self.call_timeout, self.transport.withdraw(PHONE_APP)).await {
            tracing::warn!("Could not withdraw {}: {}", PHONE_APP, e);
        }
        tracing::info!("Handheld {} stopped", self.transport.local_node());
    }
}
