//! Weighted adjacency graph.

use router_wire::NodeId;
use std::collections::{BTreeMap, BTreeSet};

/// Directed weighted adjacency map: `node -> {neighbor -> cost}`.
///
/// A symmetric graph simply lists each edge in both directions.
pub type Graph = BTreeMap<NodeId, BTreeMap<NodeId, f64>>;

/// Every node mentioned in the graph, as a key or as a neighbor
pub fn nodes(graph: &Graph) -> BTreeSet<NodeId> {
    let mut all: BTreeSet<NodeId> = graph.keys().cloned().collect();
    for neighbors in graph.values() {
        all.extend(neighbors.keys().cloned());
    }
    all
}

/// Insert an undirected edge, keeping the smaller cost if either direction
/// already exists
pub fn insert_undirected_min(graph: &mut Graph, a: &NodeId, b: &NodeId, cost: f64) {
    let forward = graph.get(a).and_then(|n| n.get(b)).copied();
    let backward = graph.get(b).and_then(|n| n.get(a)).copied();
    let best = [forward, backward]
        .into_iter()
        .flatten()
        .fold(cost, f64::min);

    graph.entry(a.clone()).or_default().insert(b.clone(), best);
    graph.entry(b.clone()).or_default().insert(a.clone(), best);
}
