//! Node identity and per-node state.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::edge::Edge;

// ---------------------------------------------------------------------------
// NodeId — unique identity for graph nodes
// ---------------------------------------------------------------------------

/// Unique identifier for a node within one graph.
///
/// IDs are monotonically assigned per graph for deterministic ordering and
/// are never reused, even after the node is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Node — payload plus named outgoing edges
// ---------------------------------------------------------------------------

/// A live node: an opaque payload plus its named outgoing edges.
///
/// The graph owns every node. Hosts refer to nodes by [`NodeId`] and borrow
/// payloads through the graph's read methods; destroying a node drops its
/// payload and removes the node wholesale.
#[derive(Debug, Clone)]
pub struct Node<T> {
    id: NodeId,
    payload: T,
    /// Optional tag copied into this node's log entries.
    payload_tag: Option<String>,
    /// Outgoing edges keyed by name. `BTreeMap` guarantees deterministic iteration.
    edges: BTreeMap<String, Edge>,
}

impl<T> Node<T> {
    pub(crate) fn new(id: NodeId, payload: T, payload_tag: Option<String>) -> Self {
        Self {
            id,
            payload,
            payload_tag,
            edges: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub(crate) fn payload_mut(&mut self) -> &mut T {
        &mut self.payload
    }

    /// Tag recorded in this node's log entries, if any.
    pub fn payload_tag(&self) -> Option<&str> {
        self.payload_tag.as_deref()
    }

    /// Look up an outgoing edge by name.
    pub fn edge(&self, name: &str) -> Option<&Edge> {
        self.edges.get(name)
    }

    /// Whether an outgoing edge with this name exists.
    pub fn has_edge(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    /// Number of outgoing edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Iterate outgoing edges in name order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &Edge)> {
        self.edges.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Targets of this node's owning edges, in edge-name order.
    pub fn owning_targets(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.edges
            .values()
            .filter(|e| e.kind.keeps_alive())
            .map(|e| e.target)
    }

    pub(crate) fn insert_edge(&mut self, name: String, edge: Edge) {
        self.edges.insert(name, edge);
    }

    pub(crate) fn remove_edge(&mut self, name: &str) -> Option<Edge> {
        self.edges.remove(name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::EdgeKind;

    #[test]
    fn display_uses_node_prefix() {
        assert_eq!(NodeId(7).to_string(), "node-7");
        assert_eq!(NodeId(0).to_string(), "node-0");
    }

    #[test]
    fn ids_order_by_value() {
        assert!(NodeId(1) < NodeId(2));
        assert_eq!(NodeId(3).as_u64(), 3);
    }

    #[test]
    fn node_id_serde_round_trip() {
        let id = NodeId(42);
        let json = serde_json::to_string(&id).unwrap();
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn edges_iterate_in_name_order() {
        let mut node = Node::new(NodeId(0), "payload", None);
        node.insert_edge(
            "zeta".into(),
            Edge {
                kind: EdgeKind::Owning,
                target: NodeId(1),
            },
        );
        node.insert_edge(
            "alpha".into(),
            Edge {
                kind: EdgeKind::Observing,
                target: NodeId(2),
            },
        );

        let names: Vec<&str> = node.edges().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn owning_targets_skip_observing_edges() {
        let mut node = Node::new(NodeId(0), (), None);
        node.insert_edge(
            "keeps".into(),
            Edge {
                kind: EdgeKind::Owning,
                target: NodeId(1),
            },
        );
        node.insert_edge(
            "watches".into(),
            Edge {
                kind: EdgeKind::Observing,
                target: NodeId(2),
            },
        );

        let targets: Vec<NodeId> = node.owning_targets().collect();
        assert_eq!(targets, vec![NodeId(1)]);
    }

    #[test]
    fn remove_edge_returns_removed_edge() {
        let mut node = Node::new(NodeId(0), (), Some("tagged".into()));
        node.insert_edge(
            "link".into(),
            Edge {
                kind: EdgeKind::Owning,
                target: NodeId(9),
            },
        );

        let removed = node.remove_edge("link");
        assert_eq!(removed.map(|e| e.target), Some(NodeId(9)));
        assert!(node.remove_edge("link").is_none());
        assert_eq!(node.edge_count(), 0);
        assert_eq!(node.payload_tag(), Some("tagged"));
    }
}
