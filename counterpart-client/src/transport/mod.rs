//! Mesh transport abstraction for Counterpart.
//!
//! This module provides a pluggable transport layer that abstracts the
//! device-to-device mesh (node discovery, capability advertisement, duplex
//! channels and one-shot messages).
//!
//! # Design
//!
//! The transport trait is async and node-oriented:
//! - `query_nodes()` / `watch_nodes()` discover reachable nodes
//! - `advertise()` / `withdraw()` publish local capabilities
//! - `open_channel()` / `close_channel()` manage duplex byte channels
//! - `send_message()` delivers a one-shot message on a path
//!
//! Events (channel lifecycle, inbound messages, node changes) are delivered
//! through explicit [`Subscription`] handles. Dropping a handle unregisters it.
//!
//! Callers never await a transport future directly; they wrap it in
//! [`bounded`] so a stalled mesh surfaces as [`TransportError::Timeout`].
//!
//! # Example
//!
//! ```ignore
//! let mesh = MemoryMesh::new();
//! let watch = mesh.join("watch");
//! let phone = mesh.join("phone");
//!
//! let channel = bounded(timeout, watch.open_channel(phone.local_node(), "/hr")).await?;
//! let mut out = bounded(timeout, watch.output_stream(&channel)).await?;
//! out.write(&[72]).await?;
//! ```

mod memory;
mod subscription;

pub use memory::{MemoryMesh, MemoryNode};
pub use subscription::{Subscribers, Subscription};

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use counterpart_types::{Capability, Channel, ChannelEvent, ChannelId, MessageEvent, NodeId};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The target node is not reachable.
    #[error("node unreachable: {0}")]
    NodeUnreachable(NodeId),

    /// Channel open failed.
    #[error("channel open failed: {0}")]
    OpenFailed(String),

    /// The channel is closed.
    #[error("channel closed")]
    ChannelClosed,

    /// No such channel.
    #[error("unknown channel: {0}")]
    UnknownChannel(ChannelId),

    /// The stream of this channel was already taken.
    #[error("stream already taken for channel {0}")]
    StreamTaken(ChannelId),

    /// Message send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Node query failed.
    #[error("node query failed: {0}")]
    QueryFailed(String),

    /// The call did not complete within its time bound.
    #[error("transport call timed out")]
    Timeout,
}

/// Which nodes a query or watch is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeFilter {
    /// Every reachable node.
    Reachable,
    /// Reachable nodes advertising the capability.
    Capability(Capability),
}

/// Identifier returned for a delivered message.
pub type RequestId = u64;

/// Writable half of a channel.
#[async_trait]
pub trait ChannelOutput: Send + Sync {
    /// Write bytes to the channel.
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;
}

/// Readable half of a channel.
#[async_trait]
pub trait ChannelInput: Send {
    /// Wait for the next chunk of bytes.
    ///
    /// Returns `Ok(None)` at end of stream.
    async fn read(&mut self) -> Result<Option<Vec<u8>>, TransportError>;
}

/// Mesh transport trait.
///
/// Implementations handle the underlying device-to-device mechanism
/// (in-memory mesh for tests and demos, a platform data layer in production).
#[async_trait]
pub trait MeshTransport: Send + Sync {
    /// Identity of this node.
    fn local_node(&self) -> NodeId;

    /// Currently reachable nodes matching `filter`, in the mesh's stable order.
    async fn query_nodes(&self, filter: NodeFilter) -> Result<Vec<NodeId>, TransportError>;

    /// Subscribe to changes of the node set matching `filter`.
    ///
    /// Every mesh change publishes the full current set, changed or not.
    fn watch_nodes(&self, filter: NodeFilter) -> Subscription<Vec<NodeId>>;

    /// Advertise a local capability.
    async fn advertise(&self, capability: Capability) -> Result<(), TransportError>;

    /// Withdraw a local capability.
    async fn withdraw(&self, capability: Capability) -> Result<(), TransportError>;

    /// Open a channel to `node` on `path`.
    async fn open_channel(&self, node: &NodeId, path: &str) -> Result<Channel, TransportError>;

    /// Close a channel.
    async fn close_channel(&self, channel: &Channel) -> Result<(), TransportError>;

    /// Acquire the writable half of a channel.
    async fn output_stream(
        &self,
        channel: &Channel,
    ) -> Result<Box<dyn ChannelOutput>, TransportError>;

    /// Acquire the readable half of a channel.
    async fn input_stream(&self, channel: &Channel)
        -> Result<Box<dyn ChannelInput>, TransportError>;

    /// Send a one-shot message to `node` on `path`.
    async fn send_message(
        &self,
        node: &NodeId,
        path: &str,
        data: &[u8],
    ) -> Result<RequestId, TransportError>;

    /// Subscribe to channel lifecycle events on this node.
    fn register_channel_callback(&self) -> Subscription<ChannelEvent>;

    /// Subscribe to messages delivered to this node.
    fn subscribe_messages(&self) -> Subscription<MessageEvent>;
}

/// Run a transport future with a time bound.
pub async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn bounded_passes_result_through() {
        let result = bounded(Duration::from_secs(1), async { Ok::<_, TransportError>(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_times_out_stalled_call() {
        let result = bounded(Duration::from_secs(1), async {
            std::future::pending::<Result<(), TransportError>>().await
        })
        .await;
        assert_eq!(result, Err(TransportError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_keeps_inner_error() {
        let result: Result<(), _> = bounded(Duration::from_secs(1), async {
            Err(TransportError::NodeUnreachable(NodeId::new("phone")))
        })
        .await;
        assert_eq!(result, Err(TransportError::NodeUnreachable(NodeId::new("phone"))));
    }
}
