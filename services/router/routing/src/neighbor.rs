//! Neighbor liveness and link cost.
//!
//! Every configured neighbor carries a [`NeighborMetric`]: the last measured
//! probe round-trip time and the last time anything was heard from it. A
//! neighbor is alive while `now - last_seen <= dead_after`.

use crate::router::Outbound;
use dashmap::DashMap;
use router_wire::{probe, NodeId, WireMessage};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Cost of a link with no measurement and no configured weight
pub const DEFAULT_LINK_COST: f64 = 1.0;

/// Interval between liveness probes
pub const DEFAULT_HELLO_PERIOD: Duration = Duration::from_secs(5);

/// Silence after which a neighbor is considered dead
pub const DEFAULT_DEAD_AFTER: Duration = Duration::from_secs(10);

/// Where a routing engine takes its per-link cost from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkCostSource {
    /// Weight from the topology configuration
    Static,
    /// Probe RTT in milliseconds, [`DEFAULT_LINK_COST`] until measured
    Measured,
}

/// Per-neighbor liveness state
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NeighborMetric {
    /// Last probe round-trip time, `None` until measured
    pub rtt: Option<Duration>,
    /// Last time any message arrived from this neighbor, `None` before first contact
    pub last_seen: Option<Instant>,
}

#[derive(Debug, Clone)]
struct PendingProbe {
    neighbor: NodeId,
    sent_at: Instant,
}

/// Liveness and cost of every configured neighbor
#[derive(Debug)]
pub struct NeighborTable {
    local: NodeId,
    configured: BTreeMap<NodeId, f64>,
    dead_after: Duration,
    metrics: DashMap<NodeId, NeighborMetric>,
    pending: DashMap<String, PendingProbe>,
}

impl NeighborTable {
    /// Create a table for `local` with its configured neighbor link weights
    pub fn new(local: NodeId, configured: BTreeMap<NodeId, f64>, dead_after: Duration) -> Self {
        let metrics = configured
            .keys()
            .map(|n| (n.clone(), NeighborMetric::default()))
            .collect();
        Self {
            local,
            configured,
            dead_after,
            metrics,
            pending: DashMap::new(),
        }
    }

    /// Local node ID
    pub fn local(&self) -> &NodeId {
        &self.local
    }

    /// Configured neighbors
    pub fn neighbors(&self) -> impl Iterator<Item = &NodeId> {
        self.configured.keys()
    }

    /// Whether `node` is a configured neighbor
    pub fn is_neighbor(&self, node: &str) -> bool {
        self.configured.contains_key(node)
    }

    /// Configured weight of the direct link to `node`
    pub fn configured_cost(&self, node: &str) -> f64 {
        self.configured.get(node).copied().unwrap_or(DEFAULT_LINK_COST)
    }

    /// Current metric for a neighbor
    pub fn metric(&self, node: &str) -> Option<NeighborMetric> {
        self.metrics.get(node).map(|m| *m)
    }

    /// Record contact from `node`. Non-neighbors are ignored.
    pub fn touch(&self, node: &str, now: Instant) -> bool {
        match self.metrics.get_mut(node) {
            Some(mut metric) => {
                metric.last_seen = Some(now);
                true
            }
            None => false,
        }
    }

    /// Whether `node` was heard from within `dead_after`
    pub fn is_alive(&self, node: &str, now: Instant) -> bool {
        self.metric(node)
            .and_then(|m| m.last_seen)
            .is_some_and(|seen| now.saturating_duration_since(seen) <= self.dead_after)
    }

    /// Whether `node` was heard from once and has since been silent past `dead_after`
    pub fn is_known_dead(&self, node: &str, now: Instant) -> bool {
        self.metric(node)
            .and_then(|m| m.last_seen)
            .is_some_and(|seen| now.saturating_duration_since(seen) > self.dead_after)
    }

    /// Neighbors currently alive
    pub fn alive(&self, now: Instant) -> BTreeSet<NodeId> {
        self.configured
            .keys()
            .filter(|n| self.is_alive(n.as_str(), now))
            .cloned()
            .collect()
    }

    /// Neighbors a flooded message may go to: alive, or never contacted yet
    pub fn flood_targets(&self, now: Instant) -> Vec<NodeId> {
        self.configured
            .keys()
            .filter(|n| !self.is_known_dead(n.as_str(), now))
            .cloned()
            .collect()
    }

    /// Measured RTT in milliseconds, or [`DEFAULT_LINK_COST`] until measured
    pub fn cost_to(&self, node: &str) -> f64 {
        self.metric(node)
            .and_then(|m| m.rtt)
            .map_or(DEFAULT_LINK_COST, |rtt| rtt.as_secs_f64() * 1000.0)
    }

    /// Cost of the direct link to `node` according to `source`
    pub fn link_cost(&self, node: &str, source: LinkCostSource) -> f64 {
        match source {
            LinkCostSource::Static => self.configured_cost(node),
            LinkCostSource::Measured => self.cost_to(node),
        }
    }

    /// Build one probe per configured neighbor and remember when each was sent
    pub fn probes(&self, now: Instant) -> Vec<Outbound> {
        self.configured
            .keys()
            .map(|neighbor| {
                let msg = probe(&self.local, neighbor);
                self.pending.insert(
                    msg.id().to_string(),
                    PendingProbe {
                        neighbor: neighbor.clone(),
                        sent_at: now,
                    },
                );
                Outbound::new(neighbor.clone(), msg)
            })
            .collect()
    }

    /// Match a probe ack to its outstanding probe; on success update RTT and
    /// liveness and return the RTT
    pub fn on_ack(&self, ack: &WireMessage, now: Instant) -> Option<Duration> {
        let probe_id = ack.headers.reply_to()?;
        // The probe stays outstanding unless the addressed neighbor answers
        let Some((_, pending)) = self.pending.remove_if(probe_id, |_, p| p.neighbor == ack.from) else {
            if self.pending.contains_key(probe_id) {
                debug!(probe = probe_id, from = %ack.from, "Ack from unexpected neighbor");
            }
            return None;
        };

        let rtt = now.saturating_duration_since(pending.sent_at);
        let mut metric = self.metrics.get_mut(ack.from.as_str())?;
        metric.rtt = Some(rtt);
        metric.last_seen = Some(now);

        info!(peer = %ack.from, rtt_ms = rtt.as_secs_f64() * 1000.0, "Probe acknowledged");
        Some(rtt)
    }

    /// Forget probes that were never acknowledged within `dead_after`
    pub fn prune_pending(&self, now: Instant) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|_, p| now.saturating_duration_since(p.sent_at) <= self.dead_after);
        before - self.pending.len()
    }

    /// Outstanding probes
    pub fn pending_probes(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use router_wire::probe_ack;

    fn node(id: &str) -> NodeId {
        NodeId::from(id)
    }

    fn table() -> NeighborTable {
        NeighborTable::new(
            node("A"),
            BTreeMap::from([(node("B"), 4.0), (node("C"), 1.0)]),
            DEFAULT_DEAD_AFTER,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_expires_after_dead_after() {
        let neighbors = table();
        let start = Instant::now();
        assert!(neighbors.alive(start).is_empty());

        assert!(neighbors.touch("B", start));
        assert!(neighbors.is_alive("B", start));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(neighbors.is_alive("B", Instant::now()));

        tokio::time::advance(Duration::from_millis(1)).await;
        let now = Instant::now();
        assert!(!neighbors.is_alive("B", now));
        assert!(neighbors.is_known_dead("B", now));
        assert!(!neighbors.is_known_dead("C", now));
    }

    #[test]
    fn test_non_neighbors_are_not_tracked() {
        let neighbors = table();
        let now = Instant::now();
        assert!(!neighbors.touch("Z", now));
        assert!(!neighbors.is_alive("Z", now));
        assert!(neighbors.metric("Z").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_ack_measures_rtt() {
        let neighbors = table();
        let probes = neighbors.probes(Instant::now());
        assert_eq!(probes.len(), 2);
        assert_eq!(neighbors.pending_probes(), 2);

        let to_b = probes.iter().find(|o| o.to == node("B")).unwrap();
        assert_eq!(neighbors.cost_to("B"), DEFAULT_LINK_COST);

        tokio::time::advance(Duration::from_millis(30)).await;
        let ack = probe_ack(&node("B"), &to_b.message);
        let rtt = neighbors.on_ack(&ack, Instant::now()).unwrap();

        assert_eq!(rtt, Duration::from_millis(30));
        assert!((neighbors.cost_to("B") - 30.0).abs() < 1e-9);
        assert!(neighbors.is_alive("B", Instant::now()));
        assert_eq!(neighbors.pending_probes(), 1);

        // A second ack for the same probe matches nothing
        assert!(neighbors.on_ack(&ack, Instant::now()).is_none());
    }

    #[test]
    fn test_ack_from_wrong_neighbor_ignored() {
        let neighbors = table();
        let probes = neighbors.probes(Instant::now());
        let to_b = probes.iter().find(|o| o.to == node("B")).unwrap();

        let forged = probe_ack(&node("C"), &to_b.message);
        assert!(neighbors.on_ack(&forged, Instant::now()).is_none());
        assert!(neighbors.metric("C").unwrap().rtt.is_none());
        assert_eq!(neighbors.pending_probes(), 2);

        // The genuine ack still matches its probe
        let ack = probe_ack(&node("B"), &to_b.message);
        assert!(neighbors.on_ack(&ack, Instant::now()).is_some());
        assert!(neighbors.metric("B").unwrap().rtt.is_some());
    }

    #[test]
    fn test_link_cost_sources() {
        let neighbors = table();
        assert_eq!(neighbors.link_cost("B", LinkCostSource::Static), 4.0);
        assert_eq!(neighbors.link_cost("B", LinkCostSource::Measured), DEFAULT_LINK_COST);
        assert_eq!(neighbors.configured_cost("Z"), DEFAULT_LINK_COST);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flood_targets_skip_known_dead() {
        let neighbors = table();
        neighbors.touch("B", Instant::now());
        assert_eq!(neighbors.flood_targets(Instant::now()), vec![node("B"), node("C")]);

        tokio::time::advance(Duration::from_secs(11)).await;
        // B went silent, C was never contacted
        assert_eq!(neighbors.flood_targets(Instant::now()), vec![node("C")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_pending() {
        let neighbors = table();
        neighbors.probes(Instant::now());
        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(neighbors.prune_pending(Instant::now()), 2);
        assert_eq!(neighbors.pending_probes(), 0);
    }
}
