//! Presence tracker.
//!
//! Follows which remote node is reachable (optionally narrowed to nodes that
//! advertise a capability) and publishes the selected node through a `watch`
//! cell. Every mesh change republishes, even when the selection is unchanged,
//! so downstream consumers get a fresh presence signal.

use std::sync::Arc;
use std::time::Duration;

use counterpart_core::select_node;
use counterpart_types::NodeId;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::transport::{bounded, MeshTransport, NodeFilter};

/// Tracks the selected node for one filter.
pub struct PresenceTracker {
    selected: watch::Receiver<Option<NodeId>>,
    task: JoinHandle<()>,
}

impl PresenceTracker {
    /// Start tracking nodes matching `filter`.
    pub fn start<T>(transport: Arc<T>, filter: NodeFilter, call_timeout: Duration) -> Self
    where
        T: MeshTransport + ?Sized + 'static,
    {
        let (tx, selected) = watch::channel(None);
        // Subscribe before querying so no change between the two is missed.
        let mut changes = transport.watch_nodes(filter);

        let task = tokio::spawn(async move {
            let initial = match bounded(call_timeout, transport.query_nodes(filter)).await {
                Ok(nodes) => select_node(&nodes),
                Err(e) => {
                    tracing::warn!("Presence query for {:?} failed: {}", filter, e);
                    None
                }
            };
            tracing::debug!("Presence {:?}: initial node {:?}", filter, initial);
            tx.send_replace(initial);

            while let Some(nodes) = changes.recv().await {
                let node = select_node(&nodes);
                if *tx.borrow() != node {
                    tracing::info!("Presence {:?}: selected node {:?}", filter, node);
                }
                tx.send_replace(node);
            }
        });

        Self { selected, task }
    }

    /// Subscribe to selection updates.
    pub fn subscribe(&self) -> watch::Receiver<Option<NodeId>> {
        self.selected.clone()
    }

    /// The currently selected node.
    pub fn current(&self) -> Option<NodeId> {
        self.selected.borrow().clone()
    }

    /// Stop tracking and drop the mesh subscription.
    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

/// The wearable a handheld talks to: the node with the app installed,
/// otherwise the first reachable node.
#[derive(Clone)]
pub struct WearableSelection {
    installed: watch::Receiver<Option<NodeId>>,
    reachable: watch::Receiver<Option<NodeId>>,
    installed_open: bool,
    reachable_open: bool,
}

impl WearableSelection {
    /// Combine an installed-capability selection with a reachable one.
    pub fn new(
        installed: watch::Receiver<Option<NodeId>>,
        reachable: watch::Receiver<Option<NodeId>>,
    ) -> Self {
        Self {
            installed,
            reachable,
            installed_open: true,
            reachable_open: true,
        }
    }

    /// The selected wearable.
    pub fn current(&self) -> Option<NodeId> {
        let installed = self.installed.borrow().clone();
        installed.or_else(|| self.reachable.borrow().clone())
    }

    /// Wait until either input publishes. Returns `false` once both are closed.
    pub async fn changed(&mut self) -> bool {
        while self.installed_open || self.reachable_open {
            tokio::select! {
                r = self.installed.changed(), if self.installed_open => match r {
                    Ok(()) => return true,
                    Err(_) => self.installed_open = false,
                },
                r = self.reachable.changed(), if self.reachable_open => match r {
                    Ok(()) => return true,
                    Err(_) => self.reachable_open = false,
                },
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::wait_for;
    use crate::transport::MemoryMesh;
    use counterpart_types::{PHONE_APP, WEAR_APP};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test(start_paused = true)]
    async fn initial_query_selects_present_node() {
        let mesh = MemoryMesh::new();
        let watch = Arc::new(mesh.join("watch"));
        let phone = mesh.join("phone");
        phone.advertise(PHONE_APP).await.unwrap();

        let tracker = PresenceTracker::start(watch, NodeFilter::Capability(PHONE_APP), TIMEOUT);
        let mut rx = tracker.subscribe();

        wait_for(&mut rx, |n| n.as_ref() == Some(&phone.local_node())).await;
        tracker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn follows_capability_changes() {
        let mesh = MemoryMesh::new();
        let watch = Arc::new(mesh.join("watch"));
        let phone = mesh.join("phone");

        let tracker = PresenceTracker::start(watch, NodeFilter::Capability(PHONE_APP), TIMEOUT);
        let mut rx = tracker.subscribe();
        tokio::task::yield_now().await;
        assert_eq!(tracker.current(), None);

        phone.advertise(PHONE_APP).await.unwrap();
        wait_for(&mut rx, |n| n.is_some()).await;

        phone.withdraw(PHONE_APP).await.unwrap();
        wait_for(&mut rx, |n| n.is_none()).await;
        tracker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn republishes_unchanged_selection() {
        let mesh = MemoryMesh::new();
        let watch = Arc::new(mesh.join("watch"));
        let phone = mesh.join("phone");
        phone.advertise(PHONE_APP).await.unwrap();

        let tracker = PresenceTracker::start(watch, NodeFilter::Capability(PHONE_APP), TIMEOUT);
        let mut rx = tracker.subscribe();
        wait_for(&mut rx, |n| n.is_some()).await;

        // An unrelated advertisement still produces a fresh signal.
        phone.advertise(WEAR_APP).await.unwrap();
        tokio::time::timeout(TIMEOUT, rx.changed())
            .await
            .expect("no republish")
            .unwrap();
        assert_eq!(*rx.borrow(), Some(phone.local_node()));
        tracker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn query_failure_is_absence() {
        let mesh = MemoryMesh::new();
        let watch = mesh.join("watch");
        mesh.join("phone");
        watch.fail_next_query("offline");

        let tracker = PresenceTracker::start(Arc::new(watch), NodeFilter::Reachable, TIMEOUT);
        let mut rx = tracker.subscribe();
        tokio::time::timeout(TIMEOUT, rx.changed())
            .await
            .expect("no publish")
            .unwrap();
        assert_eq!(*rx.borrow(), None);
        tracker.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn selection_prefers_installed_node() {
        let (installed, installed_rx) = watch::channel(None);
        let (reachable, reachable_rx) = watch::channel(Some(NodeId::from("first")));
        let mut selection = WearableSelection::new(installed_rx, reachable_rx);
        assert_eq!(selection.current(), Some(NodeId::from("first")));

        installed.send_replace(Some(NodeId::from("second")));
        assert!(selection.changed().await);
        assert_eq!(selection.current(), Some(NodeId::from("second")));

        installed.send_replace(None);
        reachable.send_replace(None);
        assert!(selection.changed().await);
        assert_eq!(selection.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn selection_outlives_one_closed_input() {
        let (installed, installed_rx) = watch::channel(None);
        let (reachable, reachable_rx) = watch::channel(None);
        let mut selection = WearableSelection::new(installed_rx, reachable_rx);
        drop(installed);

        reachable.send_replace(Some(NodeId::from("watch")));
        assert!(selection.changed().await);
        assert_eq!(selection.current(), Some(NodeId::from("watch")));

        drop(reachable);
        assert!(!selection.changed().await);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_the_cell() {
        let mesh = MemoryMesh::new();
        let watch = Arc::new(mesh.join("watch"));

        let tracker = PresenceTracker::start(watch, NodeFilter::Reachable, TIMEOUT);
        let mut rx = tracker.subscribe();
        tracker.shutdown().await;

        let closed = tokio::time::timeout(TIMEOUT, async {
            while rx.changed().await.is_ok() {}
        })
        .await;
        assert!(closed.is_ok());

        // Later mesh changes reach no tracker.
        mesh.join("phone");
        assert_eq!(*rx.borrow(), None);
    }
}
