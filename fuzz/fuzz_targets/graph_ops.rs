#![no_main]

use holdfast_graph::edge::EdgeKind;
use holdfast_graph::event_log::EventKind;
use holdfast_graph::graph::{GraphConfig, OwnershipGraph, RootHoldToken};
use holdfast_graph::node::NodeId;
use libfuzzer_sys::fuzz_target;

const MAX_STEPS: usize = 128;
const EDGE_NAMES: [&str; 4] = ["left", "right", "data", "peer"];
const TAGS: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    run_graph_program(data);
});

fn run_graph_program(data: &[u8]) {
    let config = GraphConfig {
        collect_on_edge_removal: byte(data, 0) % 2 == 1,
    };
    let mut graph: OwnershipGraph<u8> = OwnershipGraph::with_config(config);
    let mut ids: Vec<NodeId> = Vec::new();
    let mut tokens: Vec<RootHoldToken> = Vec::new();

    let mut cursor = 1usize;
    for _ in 0..MAX_STEPS {
        let opcode = byte(data, cursor);
        cursor = cursor.saturating_add(1);

        match opcode % 8 {
            0 => {
                ids.push(graph.create(byte(data, cursor)));
                cursor = cursor.saturating_add(1);
            }
            1 => {
                let tag = TAGS[usize::from(byte(data, cursor)) % TAGS.len()];
                ids.push(graph.create_tagged(byte(data, cursor), tag));
                cursor = cursor.saturating_add(1);
            }
            2 => {
                let from = pick(&ids, byte(data, cursor));
                let name = EDGE_NAMES[usize::from(byte(data, cursor + 1)) % EDGE_NAMES.len()];
                let kind = if byte(data, cursor + 2) % 2 == 0 {
                    EdgeKind::Owning
                } else {
                    EdgeKind::Observing
                };
                let to = pick(&ids, byte(data, cursor + 3));
                cursor = cursor.saturating_add(4);
                if let (Some(from), Some(to)) = (from, to) {
                    let _ = graph.add_edge(from, name, kind, to);
                }
            }
            3 => {
                let from = pick(&ids, byte(data, cursor));
                let name = EDGE_NAMES[usize::from(byte(data, cursor + 1)) % EDGE_NAMES.len()];
                cursor = cursor.saturating_add(2);
                if let Some(from) = from {
                    let _ = graph.remove_edge(from, name);
                }
            }
            4 => {
                let target = pick(&ids, byte(data, cursor));
                cursor = cursor.saturating_add(1);
                if let Some(target) = target
                    && let Ok(token) = graph.hold_root(target)
                {
                    tokens.push(token);
                }
            }
            5 => {
                if !tokens.is_empty() {
                    let index = usize::from(byte(data, cursor)) % tokens.len();
                    let token = tokens.swap_remove(index);
                    let _ = graph.release_root(token);
                }
                cursor = cursor.saturating_add(1);
            }
            6 => {
                let report = graph.collect();
                for id in &report.destroyed {
                    assert!(graph.is_destroyed(*id));
                    assert!(!report.leaked.contains(id));
                }
                for id in &report.leaked {
                    assert!(graph.is_live(*id));
                }
                assert!(report.cycle_members.is_subset(&report.leaked));
                assert_eq!(report.leak_detected(), !report.leaked.is_empty());
                check_invariants(&graph, &ids);
            }
            _ => {
                if let Some(id) = pick(&ids, byte(data, cursor)) {
                    let name = EDGE_NAMES[usize::from(byte(data, cursor + 1)) % EDGE_NAMES.len()];
                    let _ = graph.observe(id, name);
                }
                cursor = cursor.saturating_add(2);
                let _ = graph.live_count();
                let _ = graph.passes();
            }
        }
    }

    // Drain every hold; afterwards only leaked nodes may survive.
    while let Some(token) = tokens.pop() {
        let _ = graph.release_root(token);
    }
    graph.collect();
    check_invariants(&graph, &ids);
    for id in &ids {
        if graph.is_live(*id) {
            assert!(graph.leaked_nodes().contains(id));
        }
    }
}

fn check_invariants(graph: &OwnershipGraph<u8>, ids: &[NodeId]) {
    // Owning edges never dangle; observing edges may.
    for node in graph.iter_nodes() {
        for target in node.owning_targets() {
            assert!(graph.is_live(target), "owning edge into a destroyed node");
        }
    }
    // Every created node is exactly one of live or destroyed.
    for id in ids {
        assert!(graph.is_live(*id) != graph.is_destroyed(*id));
    }
    for id in graph.leaked_nodes() {
        assert!(graph.is_live(*id));
    }

    let log = graph.log();
    assert!(log.verify_chain().is_ok());
    for pair in log.entries().windows(2) {
        assert!(pair[0].sequence < pair[1].sequence);
    }
    let constructed = log
        .entries()
        .iter()
        .filter(|e| e.event == EventKind::Constructed)
        .count();
    let destroyed = log
        .entries()
        .iter()
        .filter(|e| e.event == EventKind::Destroyed)
        .count();
    assert_eq!(constructed, ids.len());
    assert_eq!(destroyed, graph.destroyed_count());
}

fn pick(ids: &[NodeId], selector: u8) -> Option<NodeId> {
    if ids.is_empty() {
        None
    } else {
        Some(ids[usize::from(selector) % ids.len()])
    }
}

fn byte(data: &[u8], index: usize) -> u8 {
    if data.is_empty() {
        return 0;
    }
    data[index % data.len()]
}
