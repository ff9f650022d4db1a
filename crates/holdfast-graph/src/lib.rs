//! Deterministic ownership-graph runtime.
//!
//! Models shared-ownership lifetimes as an explicit graph: nodes own or
//! observe each other through named edges, external strong references are
//! root holds, and releasing a hold runs a synchronous mark phase followed
//! by leaf-to-root destruction. Owning cycles are never broken; their
//! members stay live and are reported as leaks. Every construction and
//! destruction lands in an append-only, hash-chained event log, so the same
//! scenario always produces the same log and digest.
//!
//! ```
//! use holdfast_graph::{EdgeKind, OwnershipGraph};
//!
//! let mut graph = OwnershipGraph::new();
//! let parent = graph.create_tagged("parent payload", "parent");
//! let child = graph.create_tagged("child payload", "child");
//! graph.add_edge(parent, "child", EdgeKind::Owning, child)?;
//! graph.add_edge(child, "parent", EdgeKind::Observing, parent)?;
//!
//! let token = graph.hold_root(parent)?;
//! assert_eq!(graph.observe(child, "parent"), Some(&"parent payload"));
//!
//! let report = graph.release_root(token)?;
//! // The child goes first; its owner follows.
//! assert_eq!(report.destroyed, vec![child, parent]);
//! assert!(!report.leak_detected());
//! # Ok::<(), holdfast_graph::GraphError>(())
//! ```

#![forbid(unsafe_code)]

pub mod edge;
pub mod event_log;
pub mod graph;
pub mod node;
pub mod self_ref;

pub use edge::{Edge, EdgeKind};
pub use event_log::{ChainIntegrityError, EventKind, EventLog, LogDigest, LogEntry};
pub use graph::{
    CollectionReport, EdgeTarget, GraphConfig, GraphError, OwnershipGraph, RootHoldToken,
};
pub use node::{Node, NodeId};
pub use self_ref::{ObservingHandle, OwningSelfHandle, PendingSelfHandle};
