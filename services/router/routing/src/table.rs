//! Shared routing table

use crate::router::{DropReason, RouterStats, RoutingDecision};
use dashmap::DashMap;
use router_topology::PathResult;
use router_wire::NodeId;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// One routing table row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteEntry {
    /// Neighbor to forward through, `None` when unreachable
    pub next_hop: Option<NodeId>,
    /// Total path cost, `f64::INFINITY` when unreachable
    pub cost: f64,
}

impl RouteEntry {
    /// Reachable route through `next_hop`
    pub fn via(next_hop: NodeId, cost: f64) -> Self {
        Self {
            next_hop: Some(next_hop),
            cost,
        }
    }

    /// Unreachable destination
    pub fn unreachable() -> Self {
        Self {
            next_hop: None,
            cost: f64::INFINITY,
        }
    }

    /// Whether the destination can be reached
    pub fn is_reachable(&self) -> bool {
        self.next_hop.is_some() && self.cost.is_finite()
    }
}

/// Immutable set of routes published as a whole
pub type RouteSnapshot = BTreeMap<NodeId, RouteEntry>;

/// Build routes from a shortest-path result
pub fn snapshot_from_paths(result: &PathResult) -> RouteSnapshot {
    let mut routes: RouteSnapshot = result
        .distances
        .iter()
        .map(|(dst, &cost)| {
            let entry = match result.next_hop(dst.as_str()) {
                Some(hop) if cost.is_finite() => RouteEntry::via(hop.clone(), cost),
                _ => RouteEntry::unreachable(),
            };
            (dst.clone(), entry)
        })
        .collect();
    routes.insert(result.source.clone(), RouteEntry::via(result.source.clone(), 0.0));
    routes
}

/// Routing table shared by the router loops.
///
/// Routes are replaced as whole snapshots under the write lock; the self
/// entry is always `{next_hop: self, cost: 0}`.
#[derive(Debug)]
pub struct RoutingTable {
    /// Local node ID
    local: NodeId,
    /// Configured direct neighbors, used as a forwarding fallback
    neighbors: BTreeSet<NodeId>,
    /// Current routes
    routes: RwLock<RouteSnapshot>,
    /// Publications so far
    epoch: AtomicU64,
    /// Counters for statistics
    decisions_counter: AtomicU64,
    forwards_counter: AtomicU64,
    local_counter: AtomicU64,
    drops_counter: AtomicU64,
    drop_reasons: DashMap<DropReason, u64>,
}

impl RoutingTable {
    /// Create a routing table holding only the self entry
    pub fn new(local: NodeId, neighbors: impl IntoIterator<Item = NodeId>) -> Self {
        let routes = BTreeMap::from([(local.clone(), RouteEntry::via(local.clone(), 0.0))]);
        Self {
            local,
            neighbors: neighbors.into_iter().collect(),
            routes: RwLock::new(routes),
            epoch: AtomicU64::new(0),
            decisions_counter: AtomicU64::new(0),
            forwards_counter: AtomicU64::new(0),
            local_counter: AtomicU64::new(0),
            drops_counter: AtomicU64::new(0),
            drop_reasons: DashMap::new(),
        }
    }

    /// Local node ID
    pub fn local(&self) -> &NodeId {
        &self.local
    }

    /// Replace every route with `routes`; returns the new epoch
    pub async fn replace(&self, mut routes: RouteSnapshot) -> u64 {
        routes.insert(self.local.clone(), RouteEntry::via(self.local.clone(), 0.0));
        let count = routes.len();

        *self.routes.write().await = routes;
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed) + 1;

        debug!(routes = count, epoch, "Routing table replaced");
        epoch
    }

    /// Get a route for a destination
    pub async fn route(&self, dst: &NodeId) -> Option<RouteEntry> {
        self.routes.read().await.get(dst).cloned()
    }

    /// Next hop toward a destination, if one is known
    pub async fn next_hop(&self, dst: &NodeId) -> Option<NodeId> {
        self.routes
            .read()
            .await
            .get(dst)
            .and_then(|entry| entry.next_hop.clone())
    }

    /// Copy of the current routes
    pub async fn snapshot(&self) -> RouteSnapshot {
        self.routes.read().await.clone()
    }

    /// Current epoch
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Relaxed)
    }

    /// Decide where a data message for `dst` goes.
    ///
    /// Falls back to a direct send when `dst` is a configured neighbor
    /// without a table entry.
    pub async fn decide(&self, dst: &NodeId) -> RoutingDecision {
        let decision = if dst == &self.local {
            RoutingDecision::Local
        } else if let Some(hop) = self.next_hop(dst).await {
            RoutingDecision::Forward(hop)
        } else if self.neighbors.contains(dst) {
            debug!(dst = %dst, "No table entry, forwarding directly to neighbor");
            RoutingDecision::Forward(dst.clone())
        } else {
            RoutingDecision::Drop(DropReason::NoRoute)
        };

        self.record(&decision);
        decision
    }

    /// Update statistics for a routing decision
    pub fn record(&self, decision: &RoutingDecision) {
        self.decisions_counter.fetch_add(1, Ordering::Relaxed);

        match decision {
            RoutingDecision::Forward(_) => {
                self.forwards_counter.fetch_add(1, Ordering::Relaxed);
            }
            RoutingDecision::Local => {
                self.local_counter.fetch_add(1, Ordering::Relaxed);
            }
            RoutingDecision::Drop(reason) => {
                self.drops_counter.fetch_add(1, Ordering::Relaxed);
                *self.drop_reasons.entry(*reason).or_insert(0) += 1;
            }
        }
    }

    /// Human-readable rows, one per destination
    pub async fn dump(&self) -> Vec<String> {
        self.routes
            .read()
            .await
            .iter()
            .map(|(dst, entry)| {
                let hop = entry
                    .next_hop
                    .as_ref()
                    .map_or_else(|| "-".to_string(), |h| h.to_string());
                format!("dst={dst} nh={hop} cost={}", entry.cost)
            })
            .collect()
    }

    /// Log the current routes at info level
    pub async fn log_dump(&self, title: &str) {
        info!(node = %self.local, epoch = self.epoch(), "{}", title);
        for line in self.dump().await {
            info!(node = %self.local, "{}", line);
        }
    }

    /// Get routing statistics
    pub async fn stats(&self) -> RouterStats {
        let mut stats = RouterStats::new(self.local.clone());
        stats.total_routes = self.routes.read().await.len();
        stats.epoch = self.epoch();
        stats.decisions_made = self.decisions_counter.load(Ordering::Relaxed);
        stats.messages_forwarded = self.forwards_counter.load(Ordering::Relaxed);
        stats.messages_local = self.local_counter.load(Ordering::Relaxed);
        stats.messages_dropped = self.drops_counter.load(Ordering::Relaxed);
        stats.drop_reasons = self
            .drop_reasons
            .iter()
            .map(|entry| (entry.key().to_string(), *entry.value()))
            .collect();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use router_topology::{shortest_paths, Graph};

    fn node(id: &str) -> NodeId {
        NodeId::from(id)
    }

    #[tokio::test]
    async fn test_self_entry_always_present() {
        let table = RoutingTable::new(node("A"), [node("B")]);
        assert_eq!(table.route(&node("A")).await, Some(RouteEntry::via(node("A"), 0.0)));

        table.replace(BTreeMap::new()).await;
        assert_eq!(table.route(&node("A")).await, Some(RouteEntry::via(node("A"), 0.0)));

        // A bogus self entry is overwritten
        let epoch = table
            .replace(BTreeMap::from([(node("A"), RouteEntry::via(node("B"), 7.0))]))
            .await;
        assert_eq!(epoch, 2);
        assert_eq!(table.next_hop(&node("A")).await, Some(node("A")));
    }

    #[tokio::test]
    async fn test_decide() {
        let table = RoutingTable::new(node("A"), [node("B")]);
        table
            .replace(BTreeMap::from([
                (node("C"), RouteEntry::via(node("B"), 2.0)),
                (node("X"), RouteEntry::unreachable()),
            ]))
            .await;

        assert_eq!(table.decide(&node("A")).await, RoutingDecision::Local);
        assert_eq!(table.decide(&node("C")).await, RoutingDecision::Forward(node("B")));
        // Direct-neighbor fallback without a table entry
        assert_eq!(table.decide(&node("B")).await, RoutingDecision::Forward(node("B")));
        assert_eq!(
            table.decide(&node("X")).await,
            RoutingDecision::Drop(DropReason::NoRoute)
        );

        let stats = table.stats().await;
        assert_eq!(stats.decisions_made, 4);
        assert_eq!(stats.messages_forwarded, 2);
        assert_eq!(stats.messages_local, 1);
        assert_eq!(stats.messages_dropped, 1);
        assert_eq!(stats.drop_reasons.get("no route to destination"), Some(&1));
    }

    #[test]
    fn test_snapshot_from_paths() {
        let mut graph = Graph::new();
        graph.entry(node("A")).or_default().insert(node("B"), 1.0);
        graph.entry(node("B")).or_default().insert(node("C"), 2.0);
        graph.entry(node("X")).or_default();

        let routes = snapshot_from_paths(&shortest_paths(&graph, &node("A")));
        assert_eq!(routes[&node("A")], RouteEntry::via(node("A"), 0.0));
        assert_eq!(routes[&node("B")], RouteEntry::via(node("B"), 1.0));
        assert_eq!(routes[&node("C")], RouteEntry::via(node("B"), 3.0));
        assert!(!routes[&node("X")].is_reachable());
    }

    #[tokio::test]
    async fn test_dump() {
        let table = RoutingTable::new(node("A"), Vec::new());
        table
            .replace(BTreeMap::from([(node("X"), RouteEntry::unreachable())]))
            .await;

        let lines = table.dump().await;
        assert_eq!(lines, vec!["dst=A nh=A cost=0", "dst=X nh=- cost=inf"]);
    }
}
