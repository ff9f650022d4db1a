//! The ownership graph: reachability, collection, and leak reporting.
//!
//! Nodes are connected by named owning and observing edges. External strong
//! references are modeled as root holds; releasing a hold runs a synchronous
//! collection pass that destroys everything no longer reachable over owning
//! edges, leaf to root. Owning cycles are never broken: their members stay
//! live and are reported as leaked.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::edge::{Edge, EdgeKind};
use crate::event_log::{EventKind, EventLog};
use crate::node::{Node, NodeId};
use crate::self_ref::{ObservingHandle, OwningSelfHandle};

// ---------------------------------------------------------------------------
// GraphConfig — when collection passes run
// ---------------------------------------------------------------------------

/// Configuration controlling when collection passes run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Run a collection pass after each successful edge removal, in addition
    /// to the passes triggered by root releases and explicit `collect` calls.
    pub collect_on_edge_removal: bool,
}

impl GraphConfig {
    /// Configuration that collects after every edge removal.
    pub fn eager() -> Self {
        Self {
            collect_on_edge_removal: true,
        }
    }
}

// ---------------------------------------------------------------------------
// RootHoldToken — proof of one external strong reference
// ---------------------------------------------------------------------------

/// Proof of one external strong reference to a node.
///
/// Tokens cannot be cloned and releasing a hold consumes its token, so a
/// hold cannot be released twice. Each token is stamped with the identity
/// of the graph that minted it, so no other instance accepts it. A token
/// that is merely dropped leaves its hold registered and the node rooted.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a token that is never released keeps its node rooted"]
pub struct RootHoldToken {
    instance_id: u64,
    hold_id: u64,
    node_id: NodeId,
}

impl RootHoldToken {
    /// Node this hold keeps reachable.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Identifier of this hold within its graph.
    pub fn hold_id(&self) -> u64 {
        self.hold_id
    }
}

// ---------------------------------------------------------------------------
// EdgeTarget — how the caller names an edge's target
// ---------------------------------------------------------------------------

/// Target of a new edge, in the shape the caller holds it.
///
/// Distinguishing raw ids from self-reference handles lets [`add_edge`]
/// reject owning edges built from handle material before any state changes.
///
/// [`add_edge`]: OwnershipGraph::add_edge
#[derive(Debug, Clone, Copy)]
pub enum EdgeTarget<'a> {
    /// A plain node id.
    Node(NodeId),
    /// A node's own completed strong identity.
    SelfHandle(&'a OwningSelfHandle),
    /// A self-reference downgraded for handing to another node.
    Downgraded(&'a ObservingHandle),
}

impl EdgeTarget<'_> {
    fn node_id(self) -> NodeId {
        match self {
            Self::Node(id) => id,
            Self::SelfHandle(handle) => handle.node(),
            Self::Downgraded(handle) => handle.node(),
        }
    }

    /// Whether the target is expressed through self-reference material.
    fn is_handle(self) -> bool {
        !matches!(self, Self::Node(_))
    }
}

impl From<NodeId> for EdgeTarget<'_> {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl<'a> From<&'a OwningSelfHandle> for EdgeTarget<'a> {
    fn from(handle: &'a OwningSelfHandle) -> Self {
        Self::SelfHandle(handle)
    }
}

impl<'a> From<&'a ObservingHandle> for EdgeTarget<'a> {
    fn from(handle: &'a ObservingHandle) -> Self {
        Self::Downgraded(handle)
    }
}

// ---------------------------------------------------------------------------
// GraphError — typed error contract
// ---------------------------------------------------------------------------

/// Errors from graph operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphError {
    /// Edge source is not a live node.
    UnknownSource { node_id: NodeId },
    /// Named node is not live (edge target, hold target, or handle subject).
    UnknownTarget { node_id: NodeId },
    /// The source node already has an edge with this name.
    DuplicateEdgeName { node_id: NodeId, name: String },
    /// Owning edge whose target came from self-reference material.
    SelfCycleRisk { source: NodeId, target: NodeId },
    /// Self-reference handle used before completion.
    UseBeforeResolved { node_id: NodeId },
    /// Root-hold token does not belong to this graph.
    UnknownRootHold { hold_id: u64 },
}

impl GraphError {
    /// Stable code for logs and assertions.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownSource { .. } => "OG_UNKNOWN_SOURCE",
            Self::UnknownTarget { .. } => "OG_UNKNOWN_TARGET",
            Self::DuplicateEdgeName { .. } => "OG_DUPLICATE_EDGE_NAME",
            Self::SelfCycleRisk { .. } => "OG_SELF_CYCLE_RISK",
            Self::UseBeforeResolved { .. } => "OG_USE_BEFORE_RESOLVED",
            Self::UnknownRootHold { .. } => "OG_UNKNOWN_ROOT_HOLD",
        }
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSource { node_id } => {
                write!(f, "edge source {} is not live", node_id)
            }
            Self::UnknownTarget { node_id } => {
                write!(f, "node {} is not live", node_id)
            }
            Self::DuplicateEdgeName { node_id, name } => {
                write!(f, "node {} already has an edge named '{}'", node_id, name)
            }
            Self::SelfCycleRisk { source, target } => write!(
                f,
                "owning edge {} -> {} from self-reference material would risk a strong cycle",
                source, target
            ),
            Self::UseBeforeResolved { node_id } => {
                write!(f, "self-reference for {} used before completion", node_id)
            }
            Self::UnknownRootHold { hold_id } => {
                write!(f, "root hold {} does not belong to this graph", hold_id)
            }
        }
    }
}

impl std::error::Error for GraphError {}

// ---------------------------------------------------------------------------
// CollectionReport — outcome of one pass
// ---------------------------------------------------------------------------

/// Outcome of one collection pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionReport {
    /// Pass number, starting at 1.
    pub pass: u64,
    /// Nodes reachable from the remaining root holds.
    pub marked: BTreeSet<NodeId>,
    /// Nodes destroyed by this pass, in destruction order.
    pub destroyed: Vec<NodeId>,
    /// Unreachable nodes kept alive by owning cycles: the cycle members plus
    /// everything they still transitively own.
    pub leaked: BTreeSet<NodeId>,
    /// The subset of `leaked` that lies on an owning cycle.
    pub cycle_members: BTreeSet<NodeId>,
}

impl CollectionReport {
    /// Whether this pass stranded unreachable nodes instead of destroying them.
    pub fn leak_detected(&self) -> bool {
        !self.leaked.is_empty()
    }
}

// ---------------------------------------------------------------------------
// OwnershipGraph — the graph itself
// ---------------------------------------------------------------------------

/// Monotonic counter minting a distinct identity per graph instance.
static GRAPH_INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Directed object graph with owning and observing edges.
///
/// Single-threaded and synchronous: every operation completes before
/// returning, collection passes included. A multi-threaded host must
/// serialize access behind one exclusive lock.
#[derive(Debug, Clone)]
pub struct OwnershipGraph<T> {
    /// Live nodes. `BTreeMap` guarantees deterministic iteration.
    nodes: BTreeMap<NodeId, Node<T>>,
    /// Ids of destroyed nodes. Ids are never reused.
    destroyed: BTreeSet<NodeId>,
    /// Outstanding root holds, keyed by hold id.
    root_holds: BTreeMap<u64, NodeId>,
    /// Leak set from the most recent pass.
    leaked: BTreeSet<NodeId>,
    /// Identity stamped into every token this graph mints.
    instance_id: u64,
    next_node_id: u64,
    next_hold_id: u64,
    /// Completed collection passes.
    passes: u64,
    log: EventLog,
    config: GraphConfig,
}

impl<T> OwnershipGraph<T> {
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            nodes: BTreeMap::new(),
            destroyed: BTreeSet::new(),
            root_holds: BTreeMap::new(),
            leaked: BTreeSet::new(),
            instance_id: GRAPH_INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed),
            next_node_id: 0,
            next_hold_id: 0,
            passes: 0,
            log: EventLog::new(),
            config,
        }
    }

    // -- Construction --

    /// Create a node, logging its construction.
    ///
    /// The node starts with no edges and no root hold, so it is collectible
    /// until connected or held.
    pub fn create(&mut self, payload: T) -> NodeId {
        self.create_inner(payload, None)
    }

    /// Create a node whose log entries carry a payload tag.
    pub fn create_tagged(&mut self, payload: T, tag: impl Into<String>) -> NodeId {
        self.create_inner(payload, Some(tag.into()))
    }

    fn create_inner(&mut self, payload: T, tag: Option<String>) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        self.log.append(id, EventKind::Constructed, tag.clone());
        self.nodes.insert(id, Node::new(id, payload, tag));
        id
    }

    // -- Edges --

    /// Add a named edge from one live node to another.
    ///
    /// The graph is left unchanged on error. Owning edges whose target is
    /// expressed through self-reference material are rejected with
    /// [`GraphError::SelfCycleRisk`]: handing a node's own strong identity
    /// down an owning chain is exactly how accidental strong cycles form.
    /// Raw ids are not vetted; cycles built from them surface as leaks at
    /// the next pass instead.
    pub fn add_edge<'a>(
        &mut self,
        from: NodeId,
        name: impl Into<String>,
        kind: EdgeKind,
        target: impl Into<EdgeTarget<'a>>,
    ) -> Result<(), GraphError> {
        let target = target.into();
        let name = name.into();

        if !self.nodes.contains_key(&from) {
            return Err(GraphError::UnknownSource { node_id: from });
        }
        if kind.keeps_alive() && target.is_handle() {
            return Err(GraphError::SelfCycleRisk {
                source: from,
                target: target.node_id(),
            });
        }
        let to = target.node_id();
        if !self.nodes.contains_key(&to) {
            return Err(GraphError::UnknownTarget { node_id: to });
        }

        let node = self
            .nodes
            .get_mut(&from)
            .ok_or(GraphError::UnknownSource { node_id: from })?;
        if node.has_edge(&name) {
            return Err(GraphError::DuplicateEdgeName {
                node_id: from,
                name,
            });
        }
        node.insert_edge(name, Edge { kind, target: to });
        Ok(())
    }

    /// Remove a named edge. Returns whether an edge was removed; removing a
    /// missing edge, or from a destroyed node, is a no-op.
    ///
    /// With [`GraphConfig::collect_on_edge_removal`] set, a successful
    /// removal immediately runs a collection pass.
    pub fn remove_edge(&mut self, from: NodeId, name: &str) -> bool {
        let removed = self
            .nodes
            .get_mut(&from)
            .and_then(|node| node.remove_edge(name))
            .is_some();
        if removed && self.config.collect_on_edge_removal {
            self.collect();
        }
        removed
    }

    // -- Root holds --

    /// Register an external strong reference to a live node.
    ///
    /// Multiple holds on one node are independent; the node stays reachable
    /// while any of them remains. Holding a leaked node re-roots it, and the
    /// next pass removes it from the leak set.
    pub fn hold_root(&mut self, node_id: NodeId) -> Result<RootHoldToken, GraphError> {
        if !self.nodes.contains_key(&node_id) {
            return Err(GraphError::UnknownTarget { node_id });
        }
        let hold_id = self.next_hold_id;
        self.next_hold_id += 1;
        self.root_holds.insert(hold_id, node_id);
        Ok(RootHoldToken {
            instance_id: self.instance_id,
            hold_id,
            node_id,
        })
    }

    /// Release one root hold and run a collection pass.
    ///
    /// Consumes the token, so a hold cannot be released twice. Tokens carry
    /// the identity of the graph that minted them; a token from any other
    /// instance is rejected with [`GraphError::UnknownRootHold`], even when
    /// its ids happen to line up with an entry in this graph's registry.
    pub fn release_root(&mut self, token: RootHoldToken) -> Result<CollectionReport, GraphError> {
        if token.instance_id != self.instance_id {
            return Err(GraphError::UnknownRootHold {
                hold_id: token.hold_id,
            });
        }
        match self.root_holds.get(&token.hold_id) {
            Some(&node_id) if node_id == token.node_id => {
                self.root_holds.remove(&token.hold_id);
                Ok(self.collect())
            }
            _ => Err(GraphError::UnknownRootHold {
                hold_id: token.hold_id,
            }),
        }
    }

    // -- Collection --

    /// Run a collection pass now.
    ///
    /// Marks everything reachable from the remaining root holds over owning
    /// edges, then destroys the unreachable remainder leaf to root: a node
    /// is destroyed only after every node it owns in the same pass. Nodes
    /// stranded by an owning cycle are not destroyed; the cycle keeps them
    /// strongly held, so they stay live and are reported as leaked.
    ///
    /// When several nodes are eligible for destruction at the same moment,
    /// the lowest id goes first. This is the tie rule the event log's
    /// determinism rests on.
    pub fn collect(&mut self) -> CollectionReport {
        self.passes += 1;

        // -- Phase 1: Mark --
        let mut marked: BTreeSet<NodeId> = BTreeSet::new();
        let mut work_stack: Vec<NodeId> = Vec::new();

        // Seed with root-held nodes (deterministic order from BTreeMap).
        for &node_id in self.root_holds.values() {
            work_stack.push(node_id);
        }

        while let Some(id) = work_stack.pop() {
            if marked.contains(&id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&id) {
                marked.insert(id);
                for target in node.owning_targets() {
                    if !marked.contains(&target) {
                        work_stack.push(target);
                    }
                }
            }
        }

        // -- Phase 2: Plan --
        let doomed: BTreeSet<NodeId> = self
            .nodes
            .keys()
            .copied()
            .filter(|id| !marked.contains(id))
            .collect();

        let leaked = strongly_held_residue(&self.nodes, &doomed);
        let cycle_members = owning_cycle_members(&self.nodes, &leaked);
        let destroy_set: BTreeSet<NodeId> = doomed.difference(&leaked).copied().collect();

        // -- Phase 3: Destroy, leaf to root --
        let order = destruction_order(&self.nodes, &destroy_set);
        for &id in &order {
            if let Some(node) = self.nodes.remove(&id) {
                self.log.append(
                    id,
                    EventKind::Destroyed,
                    node.payload_tag().map(str::to_owned),
                );
                self.destroyed.insert(id);
            }
        }

        self.leaked = leaked.clone();
        CollectionReport {
            pass: self.passes,
            marked,
            destroyed: order,
            leaked,
            cycle_members,
        }
    }

    // -- Inspection --

    /// Resolve a named edge of a live node to its target's payload.
    ///
    /// `None` if the source is gone, the edge does not exist, or the target
    /// has been destroyed. Observing edges outlive their targets precisely
    /// so this read degrades to `None` instead of dangling.
    pub fn observe(&self, node_id: NodeId, edge_name: &str) -> Option<&T> {
        let edge = self.nodes.get(&node_id)?.edge(edge_name)?;
        self.nodes.get(&edge.target).map(Node::payload)
    }

    /// Whether a node is live. Leaked nodes are live.
    pub fn is_live(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Whether this id was destroyed by an earlier pass.
    pub fn is_destroyed(&self, node_id: NodeId) -> bool {
        self.destroyed.contains(&node_id)
    }

    /// Nodes reported leaked by the most recent pass.
    pub fn leaked_nodes(&self) -> &BTreeSet<NodeId> {
        &self.leaked
    }

    /// Read a live node.
    pub fn node(&self, node_id: NodeId) -> Option<&Node<T>> {
        self.nodes.get(&node_id)
    }

    /// Mutable payload access. Edges stay graph-managed.
    pub fn payload_mut(&mut self, node_id: NodeId) -> Option<&mut T> {
        self.nodes.get_mut(&node_id).map(Node::payload_mut)
    }

    /// Iterate live nodes in id order.
    pub fn iter_nodes(&self) -> impl Iterator<Item = &Node<T>> {
        self.nodes.values()
    }

    /// Number of live nodes.
    pub fn live_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of nodes destroyed so far.
    pub fn destroyed_count(&self) -> usize {
        self.destroyed.len()
    }

    /// Number of outstanding root holds.
    pub fn root_hold_count(&self) -> usize {
        self.root_holds.len()
    }

    /// Completed collection passes.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// The append-only construction/destruction log.
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Configuration reference.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }
}

impl<T> Default for OwnershipGraph<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Pass internals
// ---------------------------------------------------------------------------

/// Unreachable nodes that remain strongly held: owning-cycle members plus
/// everything those members still transitively own.
///
/// Works like peeling reference counts: repeatedly release doomed nodes with
/// no remaining doomed owner. Whatever cannot be released this way is exactly
/// the strongly held residue.
fn strongly_held_residue<T>(
    nodes: &BTreeMap<NodeId, Node<T>>,
    doomed: &BTreeSet<NodeId>,
) -> BTreeSet<NodeId> {
    // Owner counts within the doomed set.
    let mut owner_count: BTreeMap<NodeId, usize> = doomed.iter().map(|&id| (id, 0)).collect();
    for &id in doomed {
        let Some(node) = nodes.get(&id) else { continue };
        for target in node.owning_targets() {
            if let Some(count) = owner_count.get_mut(&target) {
                *count += 1;
            }
        }
    }

    let mut releasable: Vec<NodeId> = owner_count
        .iter()
        .filter(|&(_, &count)| count == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut residue = doomed.clone();

    while let Some(id) = releasable.pop() {
        residue.remove(&id);
        let Some(node) = nodes.get(&id) else { continue };
        for target in node.owning_targets() {
            if let Some(count) = owner_count.get_mut(&target) {
                *count -= 1;
                if *count == 0 {
                    releasable.push(target);
                }
            }
        }
    }
    residue
}

/// Residue nodes that lie on an owning cycle: they reach themselves over
/// owning edges without leaving the residue.
///
/// Every closed owning walk is confined to the residue, so searching inside
/// it is complete. Quadratic in the residue size, which stays small in
/// practice; leak sets are findings, not steady state.
fn owning_cycle_members<T>(
    nodes: &BTreeMap<NodeId, Node<T>>,
    residue: &BTreeSet<NodeId>,
) -> BTreeSet<NodeId> {
    let mut members = BTreeSet::new();
    for &start in residue {
        let mut visited: BTreeSet<NodeId> = BTreeSet::new();
        let mut work_stack: Vec<NodeId> = Vec::new();
        if let Some(node) = nodes.get(&start) {
            for target in node.owning_targets() {
                if residue.contains(&target) {
                    work_stack.push(target);
                }
            }
        }
        while let Some(id) = work_stack.pop() {
            if id == start {
                members.insert(start);
                break;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(node) = nodes.get(&id) {
                for target in node.owning_targets() {
                    if residue.contains(&target) && !visited.contains(&target) {
                        work_stack.push(target);
                    }
                }
            }
        }
    }
    members
}

/// Leaf-to-root destruction order over an acyclic destroy set.
///
/// A node becomes eligible once every node it owns inside the set is already
/// ordered; the lowest eligible id goes first.
fn destruction_order<T>(
    nodes: &BTreeMap<NodeId, Node<T>>,
    destroy_set: &BTreeSet<NodeId>,
) -> Vec<NodeId> {
    // Owner lists and pending-owned counts restricted to the destroy set.
    let mut owners: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
    let mut pending: BTreeMap<NodeId, usize> = BTreeMap::new();
    for &id in destroy_set {
        let Some(node) = nodes.get(&id) else { continue };
        let mut count = 0;
        for target in node.owning_targets() {
            if destroy_set.contains(&target) {
                owners.entry(target).or_default().push(id);
                count += 1;
            }
        }
        pending.insert(id, count);
    }

    let mut ready: BTreeSet<NodeId> = pending
        .iter()
        .filter(|&(_, &count)| count == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut order = Vec::with_capacity(destroy_set.len());

    // `pop_first` yields the lowest eligible id, which is the tie rule.
    while let Some(id) = ready.pop_first() {
        order.push(id);
        let Some(owner_ids) = owners.get(&id) else {
            continue;
        };
        for &owner in owner_ids {
            if let Some(count) = pending.get_mut(&owner) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(owner);
                }
            }
        }
    }
    order
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
