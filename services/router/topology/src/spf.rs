//! Shortest-path computation (Dijkstra) with next-hop derivation.

use crate::graph::{self, Graph};
use router_wire::NodeId;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use tracing::debug;

/// Result of a single-source shortest-path run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathResult {
    /// Source node
    pub source: NodeId,
    /// Distance to every known node (`f64::INFINITY` when unreachable)
    pub distances: BTreeMap<NodeId, f64>,
    /// Predecessor on the chosen shortest path (absent for the source and unreachable nodes)
    pub predecessors: BTreeMap<NodeId, NodeId>,
    /// First hop from the source toward every known node (`None` for the
    /// source itself and for unreachable nodes)
    pub next_hops: BTreeMap<NodeId, Option<NodeId>>,
}

impl PathResult {
    /// Distance to a node, infinite if unknown
    pub fn distance(&self, node: &str) -> f64 {
        self.distances.get(node).copied().unwrap_or(f64::INFINITY)
    }

    /// Next hop toward a node
    pub fn next_hop(&self, node: &str) -> Option<&NodeId> {
        self.next_hops.get(node).and_then(Option::as_ref)
    }

    /// Full path from the source to `dst`, inclusive at both ends
    pub fn path_to(&self, dst: &NodeId) -> Option<Vec<NodeId>> {
        if !self.distance(dst.as_str()).is_finite() {
            return None;
        }
        let mut path = vec![dst.clone()];
        let mut cur = dst;
        while cur != &self.source {
            cur = self.predecessors.get(cur)?;
            path.push(cur.clone());
            if path.len() > self.distances.len() {
                return None;
            }
        }
        path.reverse();
        Some(path)
    }
}

/// Min-heap entry ordered by tentative distance, ties broken by node id
#[derive(Debug, PartialEq)]
struct QueueEntry {
    cost: f64,
    node: NodeId,
}

impl Eq for QueueEntry {}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compute shortest paths from `source` over `graph`.
///
/// Edges with negative or non-finite cost are ignored. Distances are
/// order-independent; on tied-cost paths the chosen predecessor follows the
/// heap's node-id tie-break and is not otherwise guaranteed.
pub fn shortest_paths(graph: &Graph, source: &NodeId) -> PathResult {
    let mut all = graph::nodes(graph);
    all.insert(source.clone());

    let mut distances: BTreeMap<NodeId, f64> =
        all.iter().map(|n| (n.clone(), f64::INFINITY)).collect();
    let mut predecessors: BTreeMap<NodeId, NodeId> = BTreeMap::new();
    let mut visited: BTreeSet<NodeId> = BTreeSet::new();
    let mut queue = BinaryHeap::new();

    distances.insert(source.clone(), 0.0);
    queue.push(QueueEntry {
        cost: 0.0,
        node: source.clone(),
    });

    while let Some(QueueEntry { cost, node }) = queue.pop() {
        if !visited.insert(node.clone()) {
            continue;
        }

        let Some(neighbors) = graph.get(&node) else {
            continue;
        };
        for (neighbor, &weight) in neighbors {
            if !weight.is_finite() || weight < 0.0 {
                debug!(from = %node, to = %neighbor, weight, "Ignoring edge with invalid cost");
                continue;
            }
            let alt = cost + weight;
            if alt < distances[neighbor] {
                distances.insert(neighbor.clone(), alt);
                predecessors.insert(neighbor.clone(), node.clone());
                queue.push(QueueEntry {
                    cost: alt,
                    node: neighbor.clone(),
                });
            }
        }
    }

    let next_hops = all
        .iter()
        .map(|dst| (dst.clone(), first_hop(source, dst, &distances, &predecessors)))
        .collect();

    PathResult {
        source: source.clone(),
        distances,
        predecessors,
        next_hops,
    }
}

/// Walk the predecessor chain back from `dst` until the predecessor is the source
fn first_hop(
    source: &NodeId,
    dst: &NodeId,
    distances: &BTreeMap<NodeId, f64>,
    predecessors: &BTreeMap<NodeId, NodeId>,
) -> Option<NodeId> {
    if dst == source || !distances.get(dst).is_some_and(|d| d.is_finite()) {
        return None;
    }

    let mut cur = dst;
    for _ in 0..distances.len() {
        let prev = predecessors.get(cur)?;
        if prev == source {
            return Some(cur.clone());
        }
        cur = prev;
    }
    None
}
