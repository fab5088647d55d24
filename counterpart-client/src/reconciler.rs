//! Connection state reconciler task.
//!
//! Recomputes the [`ConnectionState`] whenever presence, the session or
//! liveness changes and publishes it only when the result differs.

use counterpart_core::{
    reconcile, ChannelStatus, ConnectionState, LivenessState, PresenceView, SessionState,
};
use counterpart_types::NodeId;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Observable inputs to reconciliation.
#[derive(Clone)]
pub struct ReconcilerInputs {
    /// Selected reachable node.
    pub reachable: watch::Receiver<Option<NodeId>>,
    /// Selected node with the app installed.
    pub installed: watch::Receiver<Option<NodeId>>,
    /// Data-channel session.
    pub session: watch::Receiver<SessionState>,
    /// Remote liveness.
    pub liveness: watch::Receiver<LivenessState>,
}

impl ReconcilerInputs {
    fn reconcile(&mut self) -> ConnectionState {
        let presence = PresenceView {
            reachable: self.reachable.borrow_and_update().clone(),
            installed: self.installed.borrow_and_update().clone(),
        };
        let channel = ChannelStatus::from(&*self.session.borrow_and_update());
        let liveness = *self.liveness.borrow_and_update();
        reconcile(&presence, channel, liveness)
    }
}

/// Publishes the reconciled connection state.
pub struct ConnectionReconciler {
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl ConnectionReconciler {
    /// Start reconciling `inputs`.
    pub fn start(mut inputs: ReconcilerInputs) -> Self {
        let (tx, state) = watch::channel(inputs.reconcile());

        let task = tokio::spawn(async move {
            loop {
                let changed = tokio::select! {
                    r = inputs.reachable.changed() => r,
                    r = inputs.installed.changed() => r,
                    r = inputs.session.changed() => r,
                    r = inputs.liveness.changed() => r,
                };
                if changed.is_err() {
                    tracing::debug!("Reconciler input closed, stopping");
                    break;
                }

                let next = inputs.reconcile();
                tx.send_if_modified(|current| {
                    if *current == next {
                        return false;
                    }
                    tracing::info!("Connection state: {} -> {}", current, next);
                    *current = next;
                    true
                });
            }
        });

        Self { state, task }
    }

    /// Subscribe to connection state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Current connection state.
    pub fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Stop reconciling.
    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::wait_for;
    use counterpart_types::{Channel, ChannelId, HR_CHANNEL_PATH};

    struct Sources {
        reachable: watch::Sender<Option<NodeId>>,
        installed: watch::Sender<Option<NodeId>>,
        session: watch::Sender<SessionState>,
        liveness: watch::Sender<LivenessState>,
    }

    fn sources() -> (Sources, ReconcilerInputs) {
        let (reachable, reachable_rx) = watch::channel(None);
        let (installed, installed_rx) = watch::channel(None);
        let (session, session_rx) = watch::channel(SessionState::Idle);
        let (liveness, liveness_rx) = watch::channel(LivenessState::Unknown);
        (
            Sources {
                reachable,
                installed,
                session,
                liveness,
            },
            ReconcilerInputs {
                reachable: reachable_rx,
                installed: installed_rx,
                session: session_rx,
                liveness: liveness_rx,
            },
        )
    }

    fn watch_node() -> Option<NodeId> {
        Some(NodeId::new("watch"))
    }

    #[tokio::test(start_paused = true)]
    async fn starts_with_no_device() {
        let (_sources, inputs) = sources();
        let reconciler = ConnectionReconciler::start(inputs);
        assert_eq!(reconciler.current(), ConnectionState::NoDeviceFound);
        reconciler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn walks_through_every_state() {
        let (sources, inputs) = sources();
        let reconciler = ConnectionReconciler::start(inputs);
        let mut state = reconciler.state();

        sources.reachable.send_replace(watch_node());
        wait_for(&mut state, |s| *s == ConnectionState::AppNotInstalled).await;

        sources.installed.send_replace(watch_node());
        wait_for(&mut state, |s| *s == ConnectionState::AppInstalledInactive).await;

        sources.liveness.send_replace(LivenessState::Active);
        wait_for(&mut state, |s| *s == ConnectionState::AppInstalledActive).await;

        sources.liveness.send_replace(LivenessState::Inactive);
        wait_for(&mut state, |s| *s == ConnectionState::AppInstalledInactive).await;

        sources.session.send_replace(SessionState::Streaming {
            node: NodeId::new("watch"),
            channel: Channel::new(ChannelId::new(1), NodeId::new("watch"), HR_CHANNEL_PATH),
        });
        wait_for(&mut state, |s| *s == ConnectionState::AppInstalledActive).await;

        sources.reachable.send_replace(None);
        sources.installed.send_replace(None);
        wait_for(&mut state, |s| *s == ConnectionState::NoDeviceFound).await;
        reconciler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_result_is_not_republished() {
        let (sources, inputs) = sources();
        let reconciler = ConnectionReconciler::start(inputs);
        let mut state = reconciler.state();
        sources.reachable.send_replace(watch_node());
        wait_for(&mut state, |s| *s == ConnectionState::AppNotInstalled).await;

        // A fresh presence signal with the same node changes nothing.
        sources.reachable.send_replace(watch_node());
        sources.liveness.send_replace(LivenessState::Inactive);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert!(!state.has_changed().unwrap());
        reconciler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_an_input_closes() {
        let (sources, inputs) = sources();
        let reconciler = ConnectionReconciler::start(inputs);
        let mut state = reconciler.state();

        drop(sources);

        let closed = tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while state.changed().await.is_ok() {}
        })
        .await;
        assert!(closed.is_ok());
    }
}
