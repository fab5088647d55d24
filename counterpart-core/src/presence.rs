//! Remote node selection.

use counterpart_types::NodeId;

/// Pick the node to pair with from a set of candidates.
///
/// The first reachable node wins. Transports report nodes in a stable order,
/// so repeated queries over the same set select the same node.
pub fn select_node(reachable: &[NodeId]) -> Option<NodeId> {
    reachable.first().cloned()
}

/// What the presence trackers currently know about the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceView {
    /// Selected reachable node, regardless of installed capabilities.
    pub reachable: Option<NodeId>,
    /// Selected node advertising the remote application's capability.
    pub installed: Option<NodeId>,
}

impl PresenceView {
    /// Check if any node is reachable.
    pub fn any_reachable(&self) -> bool {
        self.reachable.is_some() || self.installed.is_some()
    }
}
