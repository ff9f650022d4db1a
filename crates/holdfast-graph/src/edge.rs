//! Edge kinds and the edge record.
//!
//! An edge is a named, directed connection from one node to another. Owning
//! edges keep their target reachable; observing edges never do.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::NodeId;

// ---------------------------------------------------------------------------
// EdgeKind — owning vs observing
// ---------------------------------------------------------------------------

/// How an edge relates to its target's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Keeps the target reachable for as long as the source is reachable.
    Owning,
    /// Tracks the target without keeping it alive; resolution yields nothing
    /// once the target is destroyed.
    Observing,
}

impl EdgeKind {
    /// Whether this edge kind contributes to reachability.
    pub fn keeps_alive(self) -> bool {
        matches!(self, Self::Owning)
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Owning => "owning",
            Self::Observing => "observing",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Edge — a named directed connection
// ---------------------------------------------------------------------------

/// A directed edge, stored under a name on its source node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub kind: EdgeKind,
    pub target: NodeId,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_owning_keeps_alive() {
        assert!(EdgeKind::Owning.keeps_alive());
        assert!(!EdgeKind::Observing.keeps_alive());
    }

    #[test]
    fn display_names_are_lowercase() {
        assert_eq!(EdgeKind::Owning.to_string(), "owning");
        assert_eq!(EdgeKind::Observing.to_string(), "observing");
    }

    #[test]
    fn kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&EdgeKind::Owning).unwrap(),
            "\"owning\""
        );
        assert_eq!(
            serde_json::to_string(&EdgeKind::Observing).unwrap(),
            "\"observing\""
        );
    }

    #[test]
    fn edge_serde_round_trip() {
        let edge = Edge {
            kind: EdgeKind::Observing,
            target: NodeId(5),
        };
        let json = serde_json::to_string(&edge).unwrap();
        let back: Edge = serde_json::from_str(&json).unwrap();
        assert_eq!(edge, back);
    }
}
