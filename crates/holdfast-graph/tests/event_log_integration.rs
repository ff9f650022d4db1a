#![forbid(unsafe_code)]

//! Integration tests for the event log as seen through graph operations.
//!
//! Covers: entry shape, per-node event accounting, digests, serde round
//! trips, and tamper detection on a deserialized log.
//!
//! Sections: history shape, event accounting, digests, serde, tampering.

use std::collections::BTreeMap;

use holdfast_graph::edge::EdgeKind;
use holdfast_graph::event_log::{ChainIntegrityError, EventKind, EventLog, LogDigest};
use holdfast_graph::graph::OwnershipGraph;
use holdfast_graph::node::NodeId;

// ===========================================================================
// Helpers
// ===========================================================================

/// Root owning a kid, an unreferenced loner, and a two-node strong cycle.
///
/// After one pass: loner destroyed, cycle leaked, root and kid live.
fn mixed_fates() -> (OwnershipGraph<&'static str>, Vec<NodeId>) {
    let mut graph = OwnershipGraph::new();
    let root = graph.create_tagged("root", "root");
    let kid = graph.create_tagged("kid", "kid");
    let loner = graph.create_tagged("loner", "loner");
    let x = graph.create("x");
    let y = graph.create("y");
    graph.add_edge(root, "kid", EdgeKind::Owning, kid).unwrap();
    graph.add_edge(x, "peer", EdgeKind::Owning, y).unwrap();
    graph.add_edge(y, "peer", EdgeKind::Owning, x).unwrap();
    let token = graph.hold_root(root).unwrap();
    graph.collect();
    drop(token);
    (graph, vec![root, kid, loner, x, y])
}

// ===========================================================================
// 1. History shape
// ===========================================================================

#[test]
fn a_short_history_reads_back_in_order() {
    let mut graph = OwnershipGraph::new();
    let keep = graph.create_tagged("keep", "keeper");
    let drop_me = graph.create("transient");
    let token = graph.hold_root(keep).unwrap();
    graph.collect();

    let log = graph.log();
    assert_eq!(log.len(), 3);
    assert!(!log.is_empty());

    let entries = log.entries();
    assert_eq!(entries[0].node_id, keep);
    assert_eq!(entries[0].event, EventKind::Constructed);
    assert_eq!(entries[0].payload_tag.as_deref(), Some("keeper"));
    assert_eq!(entries[1].node_id, drop_me);
    assert_eq!(entries[1].payload_tag, None);
    assert_eq!(entries[2].node_id, drop_me);
    assert_eq!(entries[2].event, EventKind::Destroyed);

    assert_eq!(log.sequence_of(keep, EventKind::Constructed), Some(0));
    assert_eq!(log.sequence_of(keep, EventKind::Destroyed), None);
    assert_eq!(log.sequence_of(drop_me, EventKind::Destroyed), Some(2));
    drop(token);
}

// ===========================================================================
// 2. Event accounting
// ===========================================================================

#[test]
fn every_node_logs_one_construction_and_at_most_one_destruction() {
    let (graph, nodes) = mixed_fates();
    let mut constructed: BTreeMap<NodeId, u32> = BTreeMap::new();
    let mut destroyed: BTreeMap<NodeId, u32> = BTreeMap::new();
    for entry in graph.log().entries() {
        let bucket = match entry.event {
            EventKind::Constructed => &mut constructed,
            EventKind::Destroyed => &mut destroyed,
        };
        *bucket.entry(entry.node_id).or_default() += 1;
    }

    for id in &nodes {
        assert_eq!(constructed.get(id), Some(&1), "{id} construction count");
        assert!(destroyed.get(id).is_none_or(|&n| n == 1), "{id} destroyed twice");
    }
    // Live and leaked nodes have no destruction entry.
    for id in &nodes {
        if graph.is_live(*id) {
            assert!(!destroyed.contains_key(id), "{id} is live yet logged destroyed");
        }
    }
}

#[test]
fn construction_always_precedes_destruction() {
    let (mut graph, _nodes) = mixed_fates();
    // Tear the remaining tree down too; leaked nodes stay unlogged.
    let extra = graph.create("late");
    graph.collect();
    assert!(graph.is_destroyed(extra));

    let log = graph.log();
    for entry in log.entries() {
        if entry.event == EventKind::Destroyed {
            let born = log
                .sequence_of(entry.node_id, EventKind::Constructed)
                .unwrap();
            assert!(born < entry.sequence);
        }
    }
}

// ===========================================================================
// 3. Digests
// ===========================================================================

#[test]
fn an_untouched_graph_sits_at_the_genesis_digest() {
    let graph = OwnershipGraph::<&str>::new();
    assert_eq!(graph.log().digest(), LogDigest::GENESIS);
    assert!(graph.log().verify_chain().is_ok());
}

#[test]
fn the_digest_moves_with_every_event() {
    let mut graph = OwnershipGraph::new();
    let start = graph.log().digest();
    graph.create("a");
    let after_one = graph.log().digest();
    graph.create("b");
    let after_two = graph.log().digest();

    assert_ne!(start, after_one);
    assert_ne!(after_one, after_two);
    assert_eq!(graph.log().digest(), graph.log().entries()[1].entry_digest);
}

#[test]
fn histories_differing_only_in_a_tag_diverge() {
    let mut alpha = OwnershipGraph::new();
    alpha.create_tagged("payload", "alpha");
    let mut beta = OwnershipGraph::new();
    beta.create_tagged("payload", "beta");
    assert_ne!(alpha.log().digest(), beta.log().digest());
}

// ===========================================================================
// 4. Serde
// ===========================================================================

#[test]
fn a_log_round_trips_and_still_verifies() {
    let (graph, _nodes) = mixed_fates();
    let json = serde_json::to_string(graph.log()).unwrap();
    let restored: EventLog = serde_json::from_str(&json).unwrap();

    assert_eq!(&restored, graph.log());
    assert_eq!(restored.digest(), graph.log().digest());
    assert!(restored.verify_chain().is_ok());
}

// ===========================================================================
// 5. Tampering
// ===========================================================================

#[test]
fn a_rewritten_field_is_caught_by_the_digest() {
    let (graph, _nodes) = mixed_fates();
    let mut value = serde_json::to_value(graph.log()).unwrap();
    value["entries"][0]["node_id"] = serde_json::json!(999);

    let tampered: EventLog = serde_json::from_value(value).unwrap();
    assert_eq!(
        tampered.verify_chain(),
        Err(ChainIntegrityError::DigestMismatch { sequence: 0 })
    );
}

#[test]
fn reordered_entries_are_caught_by_the_sequence() {
    let (graph, _nodes) = mixed_fates();
    let mut value = serde_json::to_value(graph.log()).unwrap();
    let entries = value["entries"].as_array_mut().unwrap();
    entries.swap(0, 1);

    let tampered: EventLog = serde_json::from_value(value).unwrap();
    assert_eq!(
        tampered.verify_chain(),
        Err(ChainIntegrityError::SequenceGap {
            index: 0,
            sequence: 1
        })
    );
}

#[test]
fn a_bent_link_is_caught_by_the_chain() {
    let (graph, _nodes) = mixed_fates();
    let mut value = serde_json::to_value(graph.log()).unwrap();
    let byte = value["entries"][1]["prev_digest"][0].as_u64().unwrap();
    value["entries"][1]["prev_digest"][0] = serde_json::json!((byte + 1) % 256);

    let tampered: EventLog = serde_json::from_value(value).unwrap();
    assert_eq!(
        tampered.verify_chain(),
        Err(ChainIntegrityError::LinkBroken { sequence: 1 })
    );
}
