//! Two-phase self-reference: begin, complete, downgrade.
//!
//! A node that wants to hand out its own identity (typically a back
//! reference for a node it is about to own) goes through two phases.
//! `begin_self_reference` yields a pending handle that cannot be used at
//! all; `complete_self_reference` turns it into the node's strong identity.
//! The strong form is deliberately useless for building owning edges:
//! `add_edge` accepts self-reference material only downgraded, and only as
//! an observing edge.

use crate::graph::{GraphError, OwnershipGraph};
use crate::node::NodeId;

// ---------------------------------------------------------------------------
// PendingSelfHandle — started but unresolved
// ---------------------------------------------------------------------------

/// A self-reference that has been started but not completed.
///
/// Every attempt to read the identity fails with
/// [`GraphError::UseBeforeResolved`] until the graph completes the handle.
/// This models identity captured during construction, which exists before
/// it is safe to use.
#[derive(Debug)]
pub struct PendingSelfHandle {
    node_id: NodeId,
}

impl PendingSelfHandle {
    /// The identity this handle will resolve to once completed.
    ///
    /// Always fails: a pending handle is a placeholder, and reading it as
    /// if it were resolved is the bug the phase split exists to catch.
    pub fn try_node(&self) -> Result<NodeId, GraphError> {
        Err(GraphError::UseBeforeResolved {
            node_id: self.node_id,
        })
    }
}

// ---------------------------------------------------------------------------
// OwningSelfHandle — a node's completed strong identity
// ---------------------------------------------------------------------------

/// A node's own strong identity, obtained by completing a pending handle.
///
/// Holding one does not keep the node alive; lifetime flows only through
/// owning edges and root holds. What the strong form expresses is intent:
/// it is the shape `add_edge` refuses to accept for an owning edge.
#[derive(Debug)]
pub struct OwningSelfHandle {
    node_id: NodeId,
}

impl OwningSelfHandle {
    /// The node this handle names.
    pub fn node(&self) -> NodeId {
        self.node_id
    }

    /// Downgrade for handing to another node.
    ///
    /// The downgraded form is what a node passes to nodes it owns, so the
    /// back reference they store can only ever be observing.
    pub fn hand_to_child_as_observing(&self) -> ObservingHandle {
        ObservingHandle {
            node_id: self.node_id,
        }
    }
}

// ---------------------------------------------------------------------------
// ObservingHandle — downgraded self-reference
// ---------------------------------------------------------------------------

/// A downgraded self-reference, safe to store behind an observing edge.
#[derive(Debug, Clone)]
pub struct ObservingHandle {
    node_id: NodeId,
}

impl ObservingHandle {
    /// The node this handle names.
    pub fn node(&self) -> NodeId {
        self.node_id
    }
}

// ---------------------------------------------------------------------------
// Graph operations
// ---------------------------------------------------------------------------

impl<T> OwnershipGraph<T> {
    /// Start a self-reference for a live node.
    ///
    /// The returned handle is unusable until completed.
    pub fn begin_self_reference(&self, node_id: NodeId) -> Result<PendingSelfHandle, GraphError> {
        if !self.is_live(node_id) {
            return Err(GraphError::UnknownTarget { node_id });
        }
        Ok(PendingSelfHandle { node_id })
    }

    /// Complete a pending self-reference, consuming it.
    ///
    /// Completion is single-shot by move. Fails if the node was destroyed
    /// between the two phases.
    pub fn complete_self_reference(
        &self,
        pending: PendingSelfHandle,
    ) -> Result<OwningSelfHandle, GraphError> {
        let node_id = pending.node_id;
        if !self.is_live(node_id) {
            return Err(GraphError::UnknownTarget { node_id });
        }
        Ok(OwningSelfHandle { node_id })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
