//! Virtual node abstractions.
//!
//! # Virtual Nodes (VNodes) Concept
//!
//! Instead of each replica claiming a single slot, each replica claims
//! `num_virtual` slots spread around the ring. This provides:
//!
//! 1. **Better Load Distribution**: more claimed slots = smoother spread of requests
//! 2. **Gradual Rebalancing**: when a replica joins or leaves, only the requests
//!    falling just before its slots move
//!
//! # Placement
//!
//! Each virtual node has a *preferred* slot given by the ring's [`HashMode`].
//! If that slot is taken the ring probes forward (increasing index, wrapping)
//! to the next free slot. The preferred slot is therefore a hint, the actual
//! slot is decided by the ring.

use crate::hash::HashMode;
use crate::node::ServerId;

/// One virtual node of a replica, before it has been placed.
///
/// # Invariants
///
/// - `index < num_virtual` of the ring it is placed on
/// - Every `(server_id, index)` pair is placed at most once per ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualNode {
    /// The replica that owns this virtual node.
    pub server_id: ServerId,
    /// Index of this virtual node among its replica's virtual nodes.
    pub index: usize,
}

impl VirtualNode {
    /// Create a new virtual node.
    #[inline]
    pub fn new(server_id: ServerId, index: usize) -> Self {
        Self { server_id, index }
    }

    /// All virtual nodes of `server_id`, in index order.
    ///
    /// # Example
    /// ```rust
    /// use corelib::{ServerId, VirtualNode};
    ///
    /// let vnodes: Vec<_> = VirtualNode::for_server(ServerId(1), 3).collect();
    /// assert_eq!(vnodes.len(), 3);
    /// assert_eq!(vnodes[2].index, 2);
    /// ```
    pub fn for_server(server_id: ServerId, count: usize) -> impl Iterator<Item = VirtualNode> {
        (0..count).map(move |index| VirtualNode::new(server_id, index))
    }

    /// Slot this virtual node would like to occupy.
    ///
    /// # Performance
    /// - **Time**: O(1) in default mode, one MD5 round in alternate mode
    #[inline]
    pub fn preferred_slot(&self, mode: HashMode, num_slots: usize) -> usize {
        mode.node_slot(self.server_id, self.index, num_slots)
    }
}

impl std::fmt::Display for VirtualNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VNode(server={}, index={})", self.server_id, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vnode_creation() {
        let vnode = VirtualNode::new(ServerId(100), 4);
        assert_eq!(vnode.server_id, ServerId(100));
        assert_eq!(vnode.index, 4);
    }

    #[test]
    fn test_vnode_preferred_slot_default() {
        let vnode = VirtualNode::new(ServerId(10), 2);
        assert_eq!(vnode.preferred_slot(HashMode::Default, 512), 10 + 6 + 25);
    }

    #[test]
    fn test_vnodes_for_server_are_distinct() {
        let slots: Vec<usize> = VirtualNode::for_server(ServerId(1), 9)
            .map(|v| v.preferred_slot(HashMode::Default, 512))
            .collect();
        let unique: std::collections::HashSet<_> = slots.iter().collect();
        assert_eq!(unique.len(), 9);
    }
}
