//! Distance-vector routing: distributed Bellman-Ford with split horizon,
//! poisoned reverse, hold-down and triggered updates.
//!
//! Each node keeps its own cost to every known destination plus the last
//! vector advertised by each neighbor. The best route to `d` is the cheapest
//! of the direct link (if `d` is an alive neighbor) and
//! `link_cost(n) + vector_from[n][d]` over alive neighbors `n`.

use crate::error::RoutingError;
use crate::neighbor::{LinkCostSource, NeighborTable};
use crate::router::{Emit, Outbound};
use crate::strategy::{RoutingStrategy, StrategyKind};
use crate::table::{RouteEntry, RouteSnapshot};
use router_wire::{DistanceVectorAdvert, NodeId, WireMessage, DISTANCE_VECTOR_HOP_BUDGET};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Costs at or above this bound are unreachable
pub const DISTANCE_VECTOR_INFINITY: f64 = 1e12;

/// Distance-vector engine configuration
#[derive(Debug, Clone)]
pub struct DistanceVectorConfig {
    /// Minimum spacing between periodic advertisements
    pub min_interval: Duration,
    /// Advertise at least this often
    pub refresh_interval: Duration,
    /// Neighbor vectors older than this are purged
    pub max_age: Duration,
    /// Minimum spacing of a triggered update after the last advertisement
    pub triggered_backoff: Duration,
    /// Hold-down window; `None` disables hold-down
    pub hold_down: Option<Duration>,
    /// Cost increase that arms hold-down
    pub worsening_margin: f64,
    /// Cost movement that counts as a change
    pub change_epsilon: f64,
    /// Report poisoned routes as infinite rather than omitting them
    pub poisoned_reverse: bool,
    /// Hop budget of advertisements
    pub hop_budget: u32,
    /// Where link costs come from
    pub cost_source: LinkCostSource,
}

impl Default for DistanceVectorConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
            refresh_interval: Duration::from_secs(8),
            max_age: Duration::from_secs(20),
            triggered_backoff: Duration::from_millis(200),
            hold_down: Some(Duration::from_secs(8)),
            worsening_margin: 1.0,
            change_epsilon: 1e-6,
            poisoned_reverse: true,
            hop_budget: DISTANCE_VECTOR_HOP_BUDGET,
            cost_source: LinkCostSource::Static,
        }
    }
}

#[derive(Debug, Clone)]
struct ReceivedVector {
    vector: BTreeMap<NodeId, f64>,
    received_at: Instant,
}

/// Distance-vector engine
#[derive(Debug)]
pub struct DistanceVectorEngine {
    local: NodeId,
    config: DistanceVectorConfig,
    /// Our cost to every known destination (`f64::INFINITY` when unreachable)
    vector: BTreeMap<NodeId, f64>,
    next_hops: BTreeMap<NodeId, Option<NodeId>>,
    received: BTreeMap<NodeId, ReceivedVector>,
    hold_until: BTreeMap<NodeId, Instant>,
    sequence: u64,
    last_advert: Option<Instant>,
    /// Routes changed since the table was last published
    table_dirty: bool,
    /// Routes changed since the last advertisement
    changed_since_advert: bool,
    triggered: bool,
}

fn normalize(cost: f64) -> f64 {
    if cost.is_nan() || cost >= DISTANCE_VECTOR_INFINITY {
        f64::INFINITY
    } else {
        cost
    }
}

impl DistanceVectorEngine {
    /// Create an engine for `local`
    pub fn new(local: NodeId, config: DistanceVectorConfig) -> Self {
        Self {
            vector: BTreeMap::from([(local.clone(), 0.0)]),
            next_hops: BTreeMap::from([(local.clone(), Some(local.clone()))]),
            local,
            config,
            received: BTreeMap::new(),
            hold_until: BTreeMap::new(),
            sequence: 0,
            last_advert: None,
            table_dirty: true,
            changed_since_advert: true,
            triggered: false,
        }
    }

    /// Our current cost to `dst`
    pub fn cost(&self, dst: &str) -> f64 {
        self.vector.get(dst).copied().unwrap_or(f64::INFINITY)
    }

    /// Our current next hop toward `dst`
    pub fn next_hop(&self, dst: &str) -> Option<&NodeId> {
        self.next_hops.get(dst).and_then(Option::as_ref)
    }

    /// Whether `dst` is inside an active hold-down window
    pub fn in_hold_down(&self, dst: &str, now: Instant) -> bool {
        self.hold_until.get(dst).is_some_and(|until| now < *until)
    }

    /// Request a prompt advertisement
    pub fn trigger_update(&mut self) {
        self.triggered = true;
    }

    fn destinations(&self, neighbors: &NeighborTable) -> BTreeSet<NodeId> {
        let mut dests: BTreeSet<NodeId> = self.vector.keys().cloned().collect();
        dests.extend(neighbors.neighbors().cloned());
        for received in self.received.values() {
            dests.extend(received.vector.keys().cloned());
        }
        dests.remove(&self.local);
        dests
    }

    /// Best `(cost, next_hop)` toward `dst` among alive neighbors.
    ///
    /// Ties prefer the previously chosen next hop.
    fn best_route(&self, dst: &NodeId, alive: &BTreeSet<NodeId>, neighbors: &NeighborTable) -> (f64, Option<NodeId>) {
        let mut candidates: Vec<(f64, &NodeId)> = Vec::new();
        if alive.contains(dst) {
            candidates.push((neighbors.link_cost(dst.as_str(), self.config.cost_source), dst));
        }
        for n in alive {
            let advertised = self
                .received
                .get(n)
                .and_then(|r| r.vector.get(dst))
                .copied()
                .unwrap_or(f64::INFINITY);
            candidates.push((neighbors.link_cost(n.as_str(), self.config.cost_source) + advertised, n));
        }

        let mut best: (f64, Option<&NodeId>) = (f64::INFINITY, None);
        for &(cost, hop) in &candidates {
            let cost = normalize(cost);
            if cost < best.0 {
                best = (cost, Some(hop));
            }
        }

        let previous = self.next_hop(dst.as_str());
        if let (Some(prev), true) = (previous, best.0.is_finite()) {
            let prev_best = candidates
                .iter()
                .filter(|(_, hop)| *hop == prev)
                .map(|(cost, _)| normalize(*cost))
                .fold(f64::INFINITY, f64::min);
            if prev_best <= best.0 + self.config.change_epsilon {
                best = (prev_best, Some(prev));
            }
        }

        (best.0, best.1.cloned())
    }

    fn differs(&self, old: f64, new: f64) -> bool {
        match (old.is_finite(), new.is_finite()) {
            (true, true) => (old - new).abs() > self.config.change_epsilon,
            (false, false) => false,
            _ => true,
        }
    }

    /// Run Bellman-Ford over the current neighbor state; returns whether any
    /// route changed
    pub fn recompute_vector(&mut self, neighbors: &NeighborTable, now: Instant) -> bool {
        let alive = neighbors.alive(now);
        let mut new_vector = BTreeMap::from([(self.local.clone(), 0.0)]);
        let mut new_hops = BTreeMap::from([(self.local.clone(), Some(self.local.clone()))]);

        for dst in self.destinations(neighbors) {
            let (mut cost, mut hop) = self.best_route(&dst, &alive, neighbors);

            let previous = self.cost(dst.as_str());
            if self.config.hold_down.is_some() && self.in_hold_down(dst.as_str(), now) && cost < previous {
                debug!(dst = %dst, cost, previous, "Ignoring improvement during hold-down");
                cost = previous;
                hop = self.next_hop(dst.as_str()).cloned();
            }
            if !cost.is_finite() {
                hop = None;
            }

            new_vector.insert(dst.clone(), cost);
            new_hops.insert(dst, hop);
        }

        let mut changed = false;
        for (dst, &new) in &new_vector {
            let old = self.cost(dst.as_str());
            let old_hop = self.next_hops.get(dst).cloned().flatten();
            if !self.differs(old, new) && old_hop == new_hops[dst] {
                continue;
            }
            changed = true;

            let worsened = new > old + self.config.worsening_margin || (old.is_finite() && !new.is_finite());
            if let (Some(window), true) = (self.config.hold_down, worsened) {
                debug!(dst = %dst, old, new, "Route worsened, arming hold-down");
                self.hold_until.insert(dst.clone(), now + window);
            }
        }

        self.vector = new_vector;
        self.next_hops = new_hops;
        self.hold_until.retain(|_, until| now < *until);

        if changed {
            self.table_dirty = true;
            self.changed_since_advert = true;
            self.triggered = true;
        }
        changed
    }

    /// Whether an advertisement is due
    fn should_advertise(&self, now: Instant) -> bool {
        let Some(last) = self.last_advert else {
            return true;
        };
        let elapsed = now.saturating_duration_since(last);
        if self.triggered && elapsed >= self.config.triggered_backoff {
            return true;
        }
        elapsed >= self.config.min_interval
            && (self.changed_since_advert || elapsed >= self.config.refresh_interval)
    }

    /// Vector as sent to `neighbor`: routes learned through it are poisoned
    /// (or omitted without poisoned reverse)
    pub fn vector_for(&self, neighbor: &NodeId) -> BTreeMap<NodeId, f64> {
        self.vector
            .iter()
            .filter_map(|(dst, &cost)| {
                let learned_from_neighbor = dst != neighbor && self.next_hop(dst.as_str()) == Some(neighbor);
                match (learned_from_neighbor, self.config.poisoned_reverse) {
                    (false, _) => Some((dst.clone(), cost)),
                    (true, true) => Some((dst.clone(), f64::INFINITY)),
                    (true, false) => None,
                }
            })
            .collect()
    }

    /// Current routes
    pub fn table(&self) -> RouteSnapshot {
        let mut routes: RouteSnapshot = self
            .vector
            .iter()
            .map(|(dst, &cost)| {
                let entry = match self.next_hop(dst.as_str()) {
                    Some(hop) if cost.is_finite() => RouteEntry::via(hop.clone(), cost),
                    _ => RouteEntry::unreachable(),
                };
                (dst.clone(), entry)
            })
            .collect();
        routes.insert(self.local.clone(), RouteEntry::via(self.local.clone(), 0.0));
        routes
    }

    fn publish(&mut self) -> RouteSnapshot {
        self.table_dirty = false;
        self.table()
    }
}

impl RoutingStrategy for DistanceVectorEngine {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DistanceVector
    }

    fn expire(&mut self, neighbors: &NeighborTable, now: Instant) {
        let max_age = self.config.max_age;
        let before = self.received.len();
        self.received.retain(|n, r| {
            neighbors.is_neighbor(n.as_str()) && now.saturating_duration_since(r.received_at) <= max_age
        });

        let removed = before - self.received.len();
        if removed > 0 {
            info!(removed, "Expired neighbor distance vectors");
            self.recompute_vector(neighbors, now);
        }
    }

    fn advertise(&mut self, neighbors: &NeighborTable, now: Instant) -> Result<Vec<Emit>, RoutingError> {
        if !self.should_advertise(now) {
            return Ok(Vec::new());
        }
        let alive = neighbors.alive(now);
        if alive.is_empty() {
            return Ok(Vec::new());
        }

        self.sequence += 1;
        let mut emits = Vec::with_capacity(alive.len());
        for neighbor in alive {
            let advert = DistanceVectorAdvert::new(self.sequence, self.vector_for(&neighbor));
            let msg = advert.into_message(&self.local, &neighbor, self.config.hop_budget)?;
            emits.push(Emit::Send(Outbound::new(neighbor, msg)));
        }

        debug!(sequence = self.sequence, neighbors = emits.len(), "Advertising distance vector");
        self.last_advert = Some(now);
        self.triggered = false;
        self.changed_since_advert = false;
        Ok(emits)
    }

    /// Store the sender's vector, recompute and publish immediately
    fn on_receive(
        &mut self,
        msg: &WireMessage,
        neighbors: &NeighborTable,
        now: Instant,
    ) -> Result<Option<RouteSnapshot>, RoutingError> {
        let sender = msg.from.clone();
        if !neighbors.is_neighbor(sender.as_str()) {
            return Err(RoutingError::NotNeighbor(sender));
        }

        let advert = DistanceVectorAdvert::from_message(msg)?;
        let vector = advert
            .vector
            .into_iter()
            .map(|(dst, cost)| (dst, normalize(cost)))
            .collect();
        self.received.insert(
            sender,
            ReceivedVector {
                vector,
                received_at: now,
            },
        );

        self.recompute_vector(neighbors, now);
        Ok(Some(self.publish()))
    }

    fn recompute(&mut self, neighbors: &NeighborTable, now: Instant) -> Option<RouteSnapshot> {
        self.recompute_vector(neighbors, now);
        self.table_dirty.then(|| self.publish())
    }

    fn on_link_change(&mut self, _neighbor: &NodeId) {
        self.changed_since_advert = true;
        self.trigger_update();
    }
}
