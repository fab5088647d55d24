//! In-process mesh transport.
//!
//! A [`MemoryMesh`] connects any number of [`MemoryNode`]s. Nodes advertise
//! capabilities, open duplex channels to each other and exchange one-shot
//! messages. Reachability can be toggled and faults injected so that session
//! and liveness behavior can be exercised without a device.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use counterpart_types::{
    Capability, Channel, ChannelEvent, ChannelId, CloseReason, MessageEvent, NodeId,
};
use dashmap::DashMap;
use tokio::sync::{mpsc, watch};

use super::{
    ChannelInput, ChannelOutput, MeshTransport, NodeFilter, RequestId, Subscribers, Subscription,
    TransportError,
};

/// Shared in-process mesh.
///
/// Cloning yields another handle to the same mesh.
#[derive(Clone, Default)]
pub struct MemoryMesh {
    inner: Arc<MeshInner>,
}

#[derive(Default)]
struct MeshInner {
    nodes: DashMap<NodeId, Arc<NodeState>>,
    pipes: DashMap<ChannelId, Arc<Pipe>>,
    next_join: AtomicU64,
    next_channel: AtomicU64,
    next_request: AtomicU64,
}

struct NodeState {
    id: NodeId,
    joined: u64,
    reachable: AtomicBool,
    capabilities: Mutex<HashSet<Capability>>,
    faults: Mutex<Faults>,
    channel_events: Subscribers<ChannelEvent>,
    messages: Subscribers<MessageEvent>,
    watchers: Mutex<HashMap<NodeFilter, Subscribers<Vec<NodeId>>>>,
}

#[derive(Default)]
struct Faults {
    fail_next_open: Option<String>,
    fail_next_message: Option<String>,
    fail_next_query: Option<String>,
    open_delay: Option<Duration>,
}

impl NodeState {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    fn advertises(&self, capability: Capability) -> bool {
        self.capabilities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&capability)
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One direction of a channel.
struct Lane {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

impl Lane {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }
}

struct Pipe {
    id: ChannelId,
    path: String,
    opener: NodeId,
    acceptor: NodeId,
    to_opener: Lane,
    to_acceptor: Lane,
    closed: watch::Sender<bool>,
}

impl Pipe {
    fn is_endpoint(&self, node: &NodeId) -> bool {
        *node == self.opener || *node == self.acceptor
    }

    /// The channel as seen from `node`: its `node` field names the peer.
    fn view_for(&self, node: &NodeId) -> Channel {
        let peer = if *node == self.opener {
            &self.acceptor
        } else {
            &self.opener
        };
        Channel::new(self.id, peer.clone(), self.path.clone())
    }

    /// Lane carrying bytes written by `node`.
    fn lane_from(&self, node: &NodeId) -> &Lane {
        if *node == self.opener {
            &self.to_acceptor
        } else {
            &self.to_opener
        }
    }

    /// Lane carrying bytes read by `node`.
    fn lane_to(&self, node: &NodeId) -> &Lane {
        if *node == self.opener {
            &self.to_opener
        } else {
            &self.to_acceptor
        }
    }
}

/// Who initiated a channel close.
enum Closer<'a> {
    /// One endpoint closed it locally.
    Endpoint(&'a NodeId),
    /// The mesh tore it down.
    Mesh(CloseReason),
}

impl MemoryMesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reachable node to the mesh, or return the existing one.
    pub fn join(&self, id: impl Into<NodeId>) -> MemoryNode {
        let id = id.into();
        let state = self
            .inner
            .nodes
            .entry(id.clone())
            .or_insert_with(|| {
                Arc::new(NodeState {
                    id: id.clone(),
                    joined: self.inner.next_join.fetch_add(1, Ordering::SeqCst),
                    reachable: AtomicBool::new(true),
                    capabilities: Mutex::new(HashSet::new()),
                    faults: Mutex::new(Faults::default()),
                    channel_events: Subscribers::new(),
                    messages: Subscribers::new(),
                    watchers: Mutex::new(HashMap::new()),
                })
            })
            .clone();
        tracing::debug!("Node {} joined mesh", id);
        self.notify_presence();
        MemoryNode {
            mesh: self.clone(),
            state,
        }
    }

    /// Remove a node, disconnecting its channels.
    ///
    /// Handles to the departed node stay usable but can no longer reach anyone.
    pub fn leave(&self, id: &NodeId) {
        if let Some((_, state)) = self.inner.nodes.remove(id) {
            state.reachable.store(false, Ordering::SeqCst);
            self.drop_channels_of(id, CloseReason::Disconnected);
            tracing::debug!("Node {} left mesh", id);
            self.notify_presence();
        }
    }

    /// Toggle reachability of a node.
    ///
    /// An unreachable node loses its channels with a disconnected reason and
    /// disappears from every other node's queries.
    pub fn set_reachable(&self, id: &NodeId, reachable: bool) {
        let Some(state) = self.state(id) else {
            return;
        };
        let was = state.reachable.swap(reachable, Ordering::SeqCst);
        if was && !reachable {
            self.drop_channels_of(id, CloseReason::Disconnected);
        }
        if was != reachable {
            tracing::debug!("Node {} reachable: {}", id, reachable);
        }
        self.notify_presence();
    }

    /// Tear down a channel as the mesh would, reporting `reason` to both ends.
    pub fn drop_channel(&self, id: ChannelId, reason: CloseReason) -> bool {
        self.close_pipe(id, Closer::Mesh(reason))
    }

    /// Number of open channels.
    pub fn channel_count(&self) -> usize {
        self.inner.pipes.len()
    }

    fn state(&self, id: &NodeId) -> Option<Arc<NodeState>> {
        self.inner.nodes.get(id).map(|s| Arc::clone(s.value()))
    }

    fn snapshot(&self) -> Vec<Arc<NodeState>> {
        let mut nodes: Vec<Arc<NodeState>> = self
            .inner
            .nodes
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        nodes.sort_by_key(|n| n.joined);
        nodes
    }

    fn visible_nodes(&self, observer: &NodeState, filter: NodeFilter) -> Vec<NodeId> {
        if !observer.is_reachable() {
            return Vec::new();
        }
        self.snapshot()
            .into_iter()
            .filter(|n| n.id != observer.id && n.is_reachable())
            .filter(|n| match filter {
                NodeFilter::Reachable => true,
                NodeFilter::Capability(capability) => n.advertises(capability),
            })
            .map(|n| n.id.clone())
            .collect()
    }

    /// Republish node sets to every watcher on every node.
    fn notify_presence(&self) {
        for observer in self.snapshot() {
            let watchers: Vec<(NodeFilter, Subscribers<Vec<NodeId>>)> = observer
                .watchers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(filter, subs)| (*filter, subs.clone()))
                .collect();
            for (filter, subs) in watchers {
                subs.publish(self.visible_nodes(&observer, filter));
            }
        }
    }

    fn reachable_peer(&self, from: &NodeState, to: &NodeId) -> Result<Arc<NodeState>, TransportError> {
        match self.state(to) {
            Some(peer) if from.is_reachable() && peer.is_reachable() && peer.id != from.id => {
                Ok(peer)
            }
            _ => Err(TransportError::NodeUnreachable(to.clone())),
        }
    }

    fn drop_channels_of(&self, node: &NodeId, reason: CloseReason) {
        let ids: Vec<ChannelId> = self
            .inner
            .pipes
            .iter()
            .filter(|p| p.value().is_endpoint(node))
            .map(|p| *p.key())
            .collect();
        for id in ids {
            self.close_pipe(id, Closer::Mesh(reason));
        }
    }

    fn close_pipe(&self, id: ChannelId, closer: Closer<'_>) -> bool {
        let Some((_, pipe)) = self.inner.pipes.remove(&id) else {
            return false;
        };
        pipe.closed.send_replace(true);

        for end in [&pipe.opener, &pipe.acceptor] {
            let (reason, app_code) = match &closer {
                Closer::Endpoint(node) if *node == end => {
                    (CloseReason::Normal, CloseReason::CODE_LOCAL_CLOSE)
                }
                Closer::Endpoint(_) => (CloseReason::Normal, CloseReason::CODE_REMOTE_CLOSE),
                Closer::Mesh(reason) => (*reason, reason.code()),
            };
            if let Some(state) = self.state(end) {
                state.channel_events.publish(ChannelEvent::Closed {
                    channel: pipe.view_for(end),
                    reason,
                    app_code,
                });
            }
        }
        tracing::debug!("Channel {} closed", id);
        true
    }
}

/// A node on a [`MemoryMesh`], usable as a [`MeshTransport`].
#[derive(Clone)]
pub struct MemoryNode {
    mesh: MemoryMesh,
    state: Arc<NodeState>,
}

impl MemoryNode {
    /// The mesh this node belongs to.
    pub fn mesh(&self) -> &MemoryMesh {
        &self.mesh
    }

    /// Check if this node is reachable.
    pub fn is_reachable(&self) -> bool {
        self.state.is_reachable()
    }

    /// Toggle this node's reachability.
    pub fn set_reachable(&self, reachable: bool) {
        self.mesh.set_reachable(&self.state.id, reachable);
    }

    /// Check if this node currently advertises `capability`.
    pub fn advertises(&self, capability: Capability) -> bool {
        self.state.advertises(capability)
    }

    /// Cause the next `open_channel()` to fail with the given error.
    pub fn fail_next_open(&self, error: &str) {
        self.state.faults().fail_next_open = Some(error.to_string());
    }

    /// Cause the next `send_message()` to fail with the given error.
    pub fn fail_next_message(&self, error: &str) {
        self.state.faults().fail_next_message = Some(error.to_string());
    }

    /// Cause the next `query_nodes()` to fail with the given error.
    pub fn fail_next_query(&self, error: &str) {
        self.state.faults().fail_next_query = Some(error.to_string());
    }

    /// Delay every `open_channel()` by `delay`.
    pub fn set_open_delay(&self, delay: Option<Duration>) {
        self.state.faults().open_delay = delay;
    }

    /// Number of channel callbacks registered on this node.
    pub fn channel_subscriber_count(&self) -> usize {
        self.state.channel_events.len()
    }
}

#[async_trait]
impl MeshTransport for MemoryNode {
    fn local_node(&self) -> NodeId {
        self.state.id.clone()
    }

    async fn query_nodes(&self, filter: NodeFilter) -> Result<Vec<NodeId>, TransportError> {
        if let Some(error) = self.state.faults().fail_next_query.take() {
            return Err(TransportError::QueryFailed(error));
        }
        Ok(self.mesh.visible_nodes(&self.state, filter))
    }

    fn watch_nodes(&self, filter: NodeFilter) -> Subscription<Vec<NodeId>> {
        self.state
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(filter)
            .or_default()
            .subscribe()
    }

    async fn advertise(&self, capability: Capability) -> Result<(), TransportError> {
        let added = self
            .state
            .capabilities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(capability);
        if added {
            tracing::debug!("Node {} advertises {}", self.state.id, capability);
        }
        self.mesh.notify_presence();
        Ok(())
    }

    async fn withdraw(&self, capability: Capability) -> Result<(), TransportError> {
        let removed = self
            .state
            .capabilities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&capability);
        if removed {
            tracing::debug!("Node {} withdrew {}", self.state.id, capability);
        }
        self.mesh.notify_presence();
        Ok(())
    }

    async fn open_channel(&self, node: &NodeId, path: &str) -> Result<Channel, TransportError> {
        let (failure, delay) = {
            let mut faults = self.state.faults();
            (faults.fail_next_open.take(), faults.open_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = failure {
            return Err(TransportError::OpenFailed(error));
        }

        let peer = self.mesh.reachable_peer(&self.state, node)?;
        let id = ChannelId::new(self.mesh.inner.next_channel.fetch_add(1, Ordering::SeqCst) + 1);
        let (closed, _) = watch::channel(false);
        let pipe = Arc::new(Pipe {
            id,
            path: path.to_string(),
            opener: self.state.id.clone(),
            acceptor: peer.id.clone(),
            to_opener: Lane::new(),
            to_acceptor: Lane::new(),
            closed,
        });
        self.mesh.inner.pipes.insert(id, Arc::clone(&pipe));

        tracing::debug!("Channel {} opened {} -> {} on {}", id, self.state.id, peer.id, path);
        peer.channel_events
            .publish(ChannelEvent::Opened(pipe.view_for(&peer.id)));
        Ok(pipe.view_for(&self.state.id))
    }

    async fn close_channel(&self, channel: &Channel) -> Result<(), TransportError> {
        match self.mesh.inner.pipes.get(&channel.id).map(|p| Arc::clone(p.value())) {
            Some(pipe) if !pipe.is_endpoint(&self.state.id) => {
                Err(TransportError::UnknownChannel(channel.id))
            }
            Some(_) => {
                self.mesh
                    .close_pipe(channel.id, Closer::Endpoint(&self.state.id));
                Ok(())
            }
            // Already closed.
            None => Ok(()),
        }
    }

    async fn output_stream(
        &self,
        channel: &Channel,
    ) -> Result<Box<dyn ChannelOutput>, TransportError> {
        let pipe = self.endpoint_pipe(channel)?;
        Ok(Box::new(MemoryOutput {
            tx: pipe.lane_from(&self.state.id).tx.clone(),
            closed: pipe.closed.subscribe(),
        }))
    }

    async fn input_stream(
        &self,
        channel: &Channel,
    ) -> Result<Box<dyn ChannelInput>, TransportError> {
        let pipe = self.endpoint_pipe(channel)?;
        let rx = pipe
            .lane_to(&self.state.id)
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransportError::StreamTaken(channel.id))?;
        Ok(Box::new(MemoryInput {
            rx,
            closed: pipe.closed.subscribe(),
        }))
    }

    async fn send_message(
        &self,
        node: &NodeId,
        path: &str,
        data: &[u8],
    ) -> Result<RequestId, TransportError> {
        if let Some(error) = self.state.faults().fail_next_message.take() {
            return Err(TransportError::SendFailed(error));
        }
        let peer = self.mesh.reachable_peer(&self.state, node)?;
        peer.messages.publish(MessageEvent {
            source: self.state.id.clone(),
            path: path.to_string(),
            data: data.to_vec(),
        });
        Ok(self.mesh.inner.next_request.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn register_channel_callback(&self) -> Subscription<ChannelEvent> {
        self.state.channel_events.subscribe()
    }

    fn subscribe_messages(&self) -> Subscription<MessageEvent> {
        self.state.messages.subscribe()
    }
}

impl MemoryNode {
    fn endpoint_pipe(&self, channel: &Channel) -> Result<Arc<Pipe>, TransportError> {
        let pipe = self
            .mesh
            .inner
            .pipes
            .get(&channel.id)
            .map(|p| Arc::clone(p.value()))
            .ok_or(TransportError::ChannelClosed)?;
        if !pipe.is_endpoint(&self.state.id) {
            return Err(TransportError::UnknownChannel(channel.id));
        }
        Ok(pipe)
    }
}

struct MemoryOutput {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    closed: watch::Receiver<bool>,
}

#[async_trait]
impl ChannelOutput for MemoryOutput {
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let closed = *self.closed.borrow();
        if closed {
            return Err(TransportError::ChannelClosed);
        }
        self.tx
            .send(data.to_vec())
            .map_err(|_| TransportError::ChannelClosed)
    }
}

struct MemoryInput {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    closed: watch::Receiver<bool>,
}

#[async_trait]
impl ChannelInput for MemoryInput {
    async fn read(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            let closed = *self.closed.borrow();
            if closed {
                // Drain whatever was written before the close.
                return Ok(self.rx.try_recv().ok());
            }
            tokio::select! {
                biased;
                chunk = self.rx.recv() => return Ok(chunk),
                changed = self.closed.changed() => {
                    if changed.is_err() {
                        return Ok(self.rx.try_recv().ok());
                    }
                }
            }
        }
    }
}
